//! Tracks the transactions and outputs the node core asked to watch.
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use bitcoin::{block::Header, Block, BlockHash, OutPoint, Script, ScriptBuf, Transaction, Txid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use swapline_chain::ChainSource;
use tracing::{debug, info, trace};

use crate::errors::FilterError;

/// Default number of connected blocks searched for spends of a newly watched output.
pub const DEFAULT_MAINTAINED_RANGE: usize = 144;

/// An output whose spend the node core wants to learn about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedOutput {
    /// The watched output.
    pub outpoint: OutPoint,

    /// The output's locking script.
    pub script_pubkey: ScriptBuf,

    /// Block the output is believed to be spent in, if known.
    pub block_hash_hint: Option<BlockHash>,
}

/// A connected block together with an index of the outputs it spends.
#[derive(Debug)]
struct IndexedBlock {
    height: u32,
    hash: BlockHash,
    block: Block,
    spends: HashMap<OutPoint, usize>,
}

impl IndexedBlock {
    fn new(block: &Block, height: u32) -> Self {
        let spends = spend_index(block);
        Self {
            height,
            hash: block.block_hash(),
            block: block.clone(),
            spends,
        }
    }

    fn spender_of(&self, outpoint: &OutPoint) -> Option<(usize, Transaction)> {
        self.spends
            .get(outpoint)
            .map(|&idx| (idx, self.block.txdata[idx].clone()))
    }
}

fn spend_index(block: &Block) -> HashMap<OutPoint, usize> {
    block
        .txdata
        .iter()
        .enumerate()
        .flat_map(|(idx, tx)| tx.input.iter().map(move |input| (input.previous_output, idx)))
        .filter(|(outpoint, _)| *outpoint != OutPoint::null())
        .collect()
}

#[derive(Debug, Default)]
struct FilterState {
    // Txids are keyed by the script they were registered with. A txid registered without a script
    // sits under the empty script.
    scripts: HashMap<ScriptBuf, HashSet<Txid>>,
    outputs: HashMap<OutPoint, WatchedOutput>,

    // Oldest block at the front.
    blocks: VecDeque<IndexedBlock>,
}

/// The watch set of the node core, plus a spend index over recently connected blocks so that a
/// newly watched output that has already been spent is reported immediately.
#[derive(Debug)]
pub struct ChainFilter {
    source: Arc<dyn ChainSource>,
    maintained_range: usize,
    state: Mutex<FilterState>,
}

impl ChainFilter {
    /// Creates an empty filter that indexes the last `maintained_range` connected blocks.
    pub fn new(source: Arc<dyn ChainSource>, maintained_range: usize) -> Self {
        Self {
            source,
            maintained_range: maintained_range.max(1),
            state: Mutex::new(FilterState::default()),
        }
    }

    /// Watches for transactions paying to `script`, or the transaction `txid`.
    pub fn register_tx(&self, txid: Option<&Txid>, script: &Script) -> Result<(), FilterError> {
        if txid.is_none() && script.is_empty() {
            return Err(FilterError::EmptyWatch);
        }

        trace!(?txid, script = %script.to_hex_string(), "registering transaction watch");
        let mut state = self.state.lock();
        let txids = state.scripts.entry(script.to_owned()).or_default();
        if let Some(txid) = txid {
            txids.insert(*txid);
        }
        Ok(())
    }

    /// Watches for the spend of `output`.
    ///
    /// If the output has already been spent, the spending transaction and its index within its
    /// block are returned. With a block hash hint only that block is searched, fetching it from
    /// the chain source if it is not indexed. Without a hint the indexed blocks are searched.
    pub async fn register_output(
        &self,
        output: WatchedOutput,
    ) -> Result<Option<(usize, Transaction)>, FilterError> {
        let outpoint = output.outpoint;
        let hint = output.block_hash_hint;
        debug!(%outpoint, ?hint, "registering output watch");

        let indexed = {
            let mut state = self.state.lock();
            state.outputs.insert(outpoint, output);

            match hint {
                Some(hash) => state
                    .blocks
                    .iter()
                    .find(|b| b.hash == hash)
                    .map(|b| b.spender_of(&outpoint)),
                None => Some(state.blocks.iter().find_map(|b| b.spender_of(&outpoint))),
            }
        };

        let found = match (indexed, hint) {
            (Some(found), _) => found,
            (None, Some(hash)) => {
                let block = self
                    .source
                    .block(&hash)
                    .await
                    .map_err(|source| FilterError::HintedBlock { hash, source })?;
                spend_index(&block)
                    .get(&outpoint)
                    .map(|&idx| (idx, block.txdata[idx].clone()))
            }
            (None, None) => None,
        };

        if let Some((idx, tx)) = &found {
            info!(%outpoint, spender = %tx.compute_txid(), %idx, "watched output already spent");
        }
        Ok(found)
    }

    /// Stops watching `outpoint`. Returns whether it was watched.
    pub fn unwatch_output(&self, outpoint: &OutPoint) -> bool {
        self.state.lock().outputs.remove(outpoint).is_some()
    }

    /// Stops watching `script` together with the txids registered with it. Returns whether it was
    /// watched.
    pub fn unwatch_script(&self, script: &Script) -> bool {
        self.state.lock().scripts.remove(script).is_some()
    }

    /// Number of watched outputs.
    pub fn watched_outputs(&self) -> usize {
        self.state.lock().outputs.len()
    }

    /// Number of watched scripts.
    pub fn watched_scripts(&self) -> usize {
        self.state.lock().scripts.len()
    }

    /// Transactions in `block` that pay to a watched script, have a watched txid or spend a
    /// watched output, with their index in the block.
    pub fn relevant_txs(&self, block: &Block) -> Vec<(usize, Transaction)> {
        let state = self.state.lock();
        block
            .txdata
            .iter()
            .enumerate()
            .filter(|(_, tx)| {
                let txid = tx.compute_txid();
                state.scripts.values().any(|txids| txids.contains(&txid))
                    || tx.output.iter().any(|out| {
                        !out.script_pubkey.is_empty()
                            && state.scripts.contains_key(&out.script_pubkey)
                    })
                    || tx
                        .input
                        .iter()
                        .any(|input| state.outputs.contains_key(&input.previous_output))
            })
            .map(|(idx, tx)| (idx, tx.clone()))
            .collect()
    }

    /// Indexes a newly connected block, evicting blocks beyond the maintained range.
    pub fn block_connected(&self, block: &Block, height: u32) {
        let mut state = self.state.lock();
        state.blocks.push_back(IndexedBlock::new(block, height));
        while state.blocks.len() > self.maintained_range {
            state.blocks.pop_front();
        }
    }

    /// Drops the indexed block `hash`, returning it if it was indexed.
    pub fn block_disconnected(&self, hash: &BlockHash, height: u32) -> Option<Block> {
        let mut state = self.state.lock();
        let pos = state
            .blocks
            .iter()
            .rposition(|b| b.hash == *hash && b.height == height)?;
        state.blocks.remove(pos).map(|b| b.block)
    }

    /// Header of an indexed block.
    pub fn indexed_header(&self, hash: &BlockHash) -> Option<Header> {
        self.state
            .lock()
            .blocks
            .iter()
            .rev()
            .find(|b| b.hash == *hash)
            .map(|b| b.block.header)
    }

    /// Height and hash of the newest indexed block.
    pub fn indexed_tip(&self) -> Option<(u32, BlockHash)> {
        self.state.lock().blocks.back().map(|b| (b.height, b.hash))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Amount;
    use swapline_test_utils::{
        fixtures::{regtest_address, spending_tx, txid_from_byte},
        MockChain,
    };

    use super::*;

    fn filter_over(chain: &Arc<MockChain>) -> ChainFilter {
        ChainFilter::new(chain.clone(), DEFAULT_MAINTAINED_RANGE)
    }

    #[test]
    fn empty_watch_is_rejected() {
        let chain = Arc::new(MockChain::new());
        let filter = filter_over(&chain);

        assert!(matches!(
            filter.register_tx(None, Script::new()),
            Err(FilterError::EmptyWatch)
        ));
        assert!(filter.register_tx(Some(&txid_from_byte(1)), Script::new()).is_ok());
    }

    #[tokio::test]
    async fn finds_spender_in_indexed_blocks() {
        let chain = Arc::new(MockChain::new());
        let filter = filter_over(&chain);
        let watched = OutPoint::new(txid_from_byte(9), 0);
        let spender = spending_tx(watched, regtest_address(1).script_pubkey(), Amount::from_sat(900));

        chain.mine(1);
        chain.add_to_mempool(spender.clone());
        chain.mine(1);
        for height in 1..=2 {
            let block = chain.block_at(height).expect("mined");
            filter.block_connected(&block, height);
        }

        let found = filter
            .register_output(WatchedOutput {
                outpoint: watched,
                script_pubkey: ScriptBuf::new(),
                block_hash_hint: None,
            })
            .await
            .expect("lookup succeeds");
        assert_eq!(found, Some((1, spender)));
        assert_eq!(filter.watched_outputs(), 1);
    }

    #[tokio::test]
    async fn hinted_block_is_fetched_when_not_indexed() {
        let chain = Arc::new(MockChain::new());
        let filter = filter_over(&chain);
        let watched = OutPoint::new(txid_from_byte(3), 1);
        let spender = spending_tx(watched, ScriptBuf::new(), Amount::from_sat(1));
        chain.add_to_mempool(spender.clone());
        let hash = chain.mine(1)[0];

        let found = filter
            .register_output(WatchedOutput {
                outpoint: watched,
                script_pubkey: ScriptBuf::new(),
                block_hash_hint: Some(hash),
            })
            .await
            .expect("lookup succeeds");
        assert_eq!(found.map(|(_, tx)| tx.compute_txid()), Some(spender.compute_txid()));
    }

    #[tokio::test]
    async fn unspent_output_is_not_found() {
        let chain = Arc::new(MockChain::new());
        let filter = filter_over(&chain);
        let block = chain.block_at(0).expect("genesis");
        filter.block_connected(&block, 0);

        let found = filter
            .register_output(WatchedOutput {
                outpoint: OutPoint::new(txid_from_byte(4), 0),
                script_pubkey: ScriptBuf::new(),
                block_hash_hint: None,
            })
            .await
            .expect("lookup succeeds");
        assert!(found.is_none());
    }

    #[test]
    fn relevant_txs_match_scripts_and_spends() {
        let chain = Arc::new(MockChain::new());
        let filter = filter_over(&chain);
        let address = regtest_address(5);
        filter.register_tx(None, &address.script_pubkey()).unwrap();

        let paid = chain.send(Amount::from_sat(10_000), &address);
        let unrelated = chain.send(Amount::from_sat(10_000), &regtest_address(6));
        chain.mine(1);
        let block = chain.block_at(1).expect("mined");

        let relevant: Vec<Txid> = filter
            .relevant_txs(&block)
            .into_iter()
            .map(|(_, tx)| tx.compute_txid())
            .collect();
        assert_eq!(relevant, vec![paid]);
        assert!(!relevant.contains(&unrelated));

        assert!(filter.unwatch_script(&address.script_pubkey()));
        assert!(filter.relevant_txs(&block).is_empty());
    }

    #[test]
    fn maintained_range_bounds_the_index() {
        let chain = Arc::new(MockChain::new());
        let filter = ChainFilter::new(chain.clone(), 2);
        chain.mine(3);
        for height in 1..=3 {
            filter.block_connected(&chain.block_at(height).expect("mined"), height);
        }

        let first = chain.block_at(1).expect("mined").block_hash();
        assert!(filter.indexed_header(&first).is_none());
        assert_eq!(filter.indexed_tip().map(|(h, _)| h), Some(3));

        let third = chain.block_at(3).expect("mined").block_hash();
        assert!(filter.block_disconnected(&third, 3).is_some());
        assert_eq!(filter.indexed_tip().map(|(h, _)| h), Some(2));
    }
}
