//! Retry configuration of the persister.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swapline_common::retry::RetryConfig;

/// Default number of retries of a failed manager write.
pub const DEFAULT_MAX_RETRY_COUNT: usize = 3;

/// Default pause before the first retry of a failed manager write. Later pauses double.
pub const DEFAULT_BACKOFF_PERIOD: Duration = Duration::from_millis(500);

/// How hard [`StatePersister`](super::StatePersister) tries before giving up on a manager write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistConfig {
    max_retry_count: usize,
    backoff_period: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            backoff_period: DEFAULT_BACKOFF_PERIOD,
        }
    }
}

impl PersistConfig {
    /// Sets the number of retries.
    pub fn with_max_retry_count(self, count: usize) -> Self {
        Self {
            max_retry_count: count,
            ..self
        }
    }

    /// Sets the pause before the first retry.
    pub fn with_backoff_period(self, period: Duration) -> Self {
        Self {
            backoff_period: period,
            ..self
        }
    }

    /// Number of retries after the first failed write.
    pub const fn max_retry_count(&self) -> usize {
        self.max_retry_count
    }

    /// Pause before the first retry.
    pub const fn backoff_period(&self) -> Duration {
        self.backoff_period
    }

    /// The backoff schedule of manager writes: starts at the backoff period, doubles on every
    /// retry and stops growing at eight times the backoff period.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.max_retry_count)
            .with_delays(self.backoff_period, self.backoff_period.saturating_mul(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedule_starts_at_backoff_period() {
        let retry = PersistConfig::default()
            .with_max_retry_count(4)
            .with_backoff_period(Duration::from_millis(100))
            .retry();
        assert_eq!(retry.max_attempts(), 5);
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(10), Duration::from_millis(800));
    }
}
