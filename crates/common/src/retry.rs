//! Bounded exponential backoff for fallible async calls.
use std::{future::Future, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default upper bound on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Governs how often and how patiently an operation is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt. Zero means "try once".
    pub max_retries: usize,

    /// Delay before the first retry. Doubles after every failed retry.
    pub base_delay: Duration,

    /// Cap applied to the doubled delay.
    pub max_delay: Duration,

    /// Upper bound of the random jitter added to every delay, in milliseconds.
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_ms: 0,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_ms: 0,
        }
    }

    /// Sets the number of retries.
    pub const fn with_max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Sets the base and maximum delays.
    pub const fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Total number of attempts this config allows.
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// The delay to wait after the failed attempt number `attempt` (zero-based), jitter excluded.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(u32::MAX as usize) as u32);
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=self.jitter_ms))
        }
    }
}

/// Runs `action` until it succeeds or the attempts allowed by `config` are used up, sleeping with
/// exponential backoff in between. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &'static str,
    config: &RetryConfig,
    action: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_when(label, config, |_| true, action).await
}

/// Like [`retry_with_backoff`], but only errors for which `retryable` returns `true` are retried.
/// Any other error is returned immediately.
pub async fn retry_with_backoff_when<T, E, P, F, Fut>(
    label: &'static str,
    config: &RetryConfig,
    retryable: P,
    mut action: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.max_attempts();
    let mut attempt = 0;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts || !retryable(&err) => return Err(err),
            Err(err) => {
                let delay = config.backoff(attempt) + config.jitter();
                warn!(%label, attempt = attempt + 1, %err, ?delay, "attempt failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
