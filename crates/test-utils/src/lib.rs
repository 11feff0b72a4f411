//! Test utilities shared by the swapline crates.
//!
//! [`MockChain`](chain::MockChain) is an in-memory blockchain that implements both
//! [`ChainSource`](swapline_chain::ChainSource) and [`Miner`](swapline_chain::Miner), so the sync,
//! filter, broadcast and swap logic can be exercised without a running `bitcoind`.

pub mod chain;
pub mod fixtures;

pub use chain::MockChain;
