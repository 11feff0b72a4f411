//! Swap configuration.
use std::time::Duration;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::errors::SwapError;

/// Default confirmation depth required before the Holder settles.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 3;

/// Default bound on both waits of a commit.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Default interval between two checks of the on-chain payment.
pub const DEFAULT_SWAP_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How swaps are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Network the on-chain addresses must belong to.
    pub network: Network,

    /// Depth the on-chain payment must reach before the preimage is revealed. At least 1.
    pub min_confirmations: u32,

    /// Bound on the Holder's confirmation wait and on the Seeker's preimage wait.
    pub confirmation_timeout: Duration,

    /// Interval between two checks of the on-chain payment.
    pub poll_interval: Duration,
}

impl SwapConfig {
    /// A config with the defaults for `network`.
    pub const fn new(network: Network) -> Self {
        Self {
            network,
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_SWAP_POLL_INTERVAL,
        }
    }

    /// Sets the required confirmation depth.
    pub fn with_min_confirmations(self, min_confirmations: u32) -> Self {
        Self {
            min_confirmations,
            ..self
        }
    }

    /// Sets the wait bound.
    pub fn with_confirmation_timeout(self, confirmation_timeout: Duration) -> Self {
        Self {
            confirmation_timeout,
            ..self
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Rejects configs that would allow revealing the preimage against an unconfirmed payment or
    /// wait forever.
    pub fn validate(&self) -> Result<(), SwapError> {
        if self.min_confirmations == 0 {
            return Err(SwapError::InvalidConfig(
                "min_confirmations must be at least 1".to_string(),
            ));
        }
        if self.confirmation_timeout.is_zero() {
            return Err(SwapError::InvalidConfig(
                "confirmation_timeout must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SwapError::InvalidConfig(
                "poll_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
