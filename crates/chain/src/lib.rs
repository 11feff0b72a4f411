//! # `swapline-chain`
//!
//! The boundary between swapline and the blockchain. It defines the [`ChainSource`] contract that
//! every on-chain data provider implements, the data it exchanges and a Bitcoin Core JSON-RPC
//! implementation of it.

pub mod config;
pub mod errors;
pub mod rpc;
pub mod source;
pub mod types;

pub use config::BitcoindConfig;
pub use errors::{ChainIOError, ChainResult};
pub use rpc::BitcoindRpc;
pub use source::{ChainSource, Miner};
pub use types::{ChainTip, DecodedScript, DescriptorInfo, ScannedUtxo, UtxoScan};
