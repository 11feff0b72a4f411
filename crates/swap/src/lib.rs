//! # `swapline-swap`
//!
//! Atomic submarine swaps between an on-chain payment and an off-chain payment that share a hash
//! commitment.
//!
//! The *Holder* knows the preimage and is paid on-chain. The *Seeker* pays on-chain and learns the
//! preimage once the Holder settles the off-chain invoice for the hash. The Holder never settles
//! before the on-chain payment is buried at the configured depth, so neither side can end up with
//! both legs.

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod recovery;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use capabilities::{OffChainInvoices, OnChainPayments};
pub use config::SwapConfig;
pub use coordinator::{RoleState, SubmarineSwapCoordinator, SwapContext};
pub use errors::SwapError;
pub use recovery::{recover_pending, PendingSwap};
pub use store::{InMemorySwapStore, SqliteSwapStore, SwapStore};
pub use types::{SwapInfo, SwapRecord, SwapRole, SwapStatus};
