//! Configuration for the Bitcoin Core chain source.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swapline_common::retry::RetryConfig;

/// Default timeout applied to a single JSON-RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection details for a `bitcoind` JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoindConfig {
    /// The RPC URL, e.g. `http://localhost:18443`.
    pub url: String,

    /// RPC user name.
    pub user: String,

    /// RPC password.
    pub pass: String,

    /// Timeout of a single request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Retry policy for idempotent calls. Submission is never retried by the RPC layer.
    #[serde(default)]
    pub retry: RetryConfig,
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl BitcoindConfig {
    /// Creates a config with the default timeout and retry policy.
    pub fn new(url: impl Into<String>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            pass: pass.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    /// Updates the retry policy and returns the updated config.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
