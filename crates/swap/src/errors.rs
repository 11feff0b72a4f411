//! Swap error types.
use bitcoin::hashes::sha256;
use swapline_chain::ChainIOError;
use thiserror::Error;

use crate::types::SwapStatus;

/// Failure of the on-chain payment capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wallet: {0}")]
pub struct WalletError(pub String);

/// Failure of the off-chain invoice capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice: {0}")]
pub struct InvoiceError(pub String);

/// Failure of the swap store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database failed.
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt swap record: {0}")]
    Corrupt(String),

    /// No swap is stored under the hash.
    #[error("no swap for {0}")]
    NotFound(sha256::Hash),
}

/// Everything that can make a swap phase fail.
#[derive(Debug, Error)]
pub enum SwapError {
    /// A precondition of opening the swap does not hold. Nothing was persisted.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The on-chain payment did not reach the required depth in time.
    #[error("on-chain payment not confirmed in time")]
    ConfirmationTimeout,

    /// The counterparty did not settle the invoice in time.
    #[error("counterparty did not reveal the preimage in time")]
    CounterpartyUnresponsive,

    /// The phase is not allowed from the current status.
    #[error("cannot move swap from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: SwapStatus,

        /// Requested status.
        to: SwapStatus,
    },

    /// The Seeker's on-chain payment is already broadcast, so the swap can no longer be canceled.
    #[error("on-chain payment already sent, swap must be completed")]
    FundsInFlight,

    /// The wait was aborted through the abort handle.
    #[error("swap phase aborted")]
    Aborted,

    /// The revealed preimage does not hash to the commitment.
    #[error("revealed preimage does not match {expected}")]
    InvalidPreimage {
        /// The commitment.
        expected: sha256::Hash,
    },

    /// The configuration is unusable.
    #[error("invalid swap config: {0}")]
    InvalidConfig(String),

    /// The chain source failed.
    #[error(transparent)]
    Chain(#[from] ChainIOError),

    /// The swap store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The on-chain payment capability failed.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The off-chain invoice capability failed.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
}
