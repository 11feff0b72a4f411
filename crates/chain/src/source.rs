//! The [`ChainSource`] contract.

use async_trait::async_trait;
use bitcoin::{Block, BlockHash, Script, Transaction, Txid};

use crate::{
    errors::ChainResult,
    types::{ChainTip, DecodedScript, DescriptorInfo, UtxoScan},
};

/// Supplies everything swapline needs to know about the blockchain.
///
/// Every call except [`ChainSource::submit_transaction`] is idempotent and can be retried safely.
/// Submitting the same transaction twice may broadcast it twice but can never double-spend on its
/// own.
#[async_trait]
pub trait ChainSource: Send + Sync + std::fmt::Debug {
    /// Height of the best block.
    async fn chaintip_height(&self) -> ChainResult<u32>;

    /// Hash of the best block.
    async fn chaintip_hash(&self) -> ChainResult<BlockHash>;

    /// Hands a signed transaction to the network and returns its txid.
    async fn submit_transaction(&self, tx: &Transaction) -> ChainResult<Txid>;

    /// Looks up a transaction by txid, in the mempool or in a block.
    async fn get_transaction(&self, txid: &Txid) -> ChainResult<Transaction>;

    /// Decodes a script into its structured form.
    async fn decode_script(&self, script: &Script) -> ChainResult<DecodedScript>;

    /// Analyses an output descriptor and returns its canonical, checksummed form.
    async fn descriptor_info(&self, descriptor: &str) -> ChainResult<DescriptorInfo>;

    /// Scans the UTXO set for outputs matching a checksummed descriptor.
    async fn scan_utxo_set(&self, descriptor: &str) -> ChainResult<UtxoScan>;

    /// Hash of the main-chain block at `height`.
    async fn block_hash(&self, height: u32) -> ChainResult<BlockHash>;

    /// The full block with the given hash.
    async fn block(&self, hash: &BlockHash) -> ChainResult<Block>;

    /// The current tip as a single value.
    ///
    /// The two reads are not atomic: the hash is re-read until the height observed before and
    /// after it agree.
    async fn chaintip(&self) -> ChainResult<ChainTip> {
        loop {
            let height = self.chaintip_height().await?;
            let hash = self.chaintip_hash().await?;
            if self.chaintip_height().await? == height {
                return Ok(ChainTip::new(height, hash));
            }
        }
    }
}

/// Test-only helper that extends the chain on demand.
#[async_trait]
pub trait Miner: Send + Sync {
    /// Mines `count` blocks paying the coinbase to `address` and returns their hashes.
    async fn mine_blocks(&self, count: u32, address: &str) -> ChainResult<Vec<BlockHash>>;
}
