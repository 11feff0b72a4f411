//! Forwards block notifications to the node core and tracks the resulting chain tip.
use std::{collections::VecDeque, fmt};

use bitcoin::{block::Header, Block, BlockHash};
use parking_lot::Mutex;
use swapline_chain::ChainTip;
use tracing::{debug, info, warn};

use crate::core::NodeCoreHandles;

/// Default number of recently connected blocks kept to unwind reorgs.
pub const DEFAULT_REORG_WINDOW: usize = 6;

/// A recently connected block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Height of the block.
    pub height: u32,

    /// Hash of the block.
    pub hash: BlockHash,

    /// Hash of the block's parent.
    pub prev_hash: BlockHash,
}

#[derive(Debug)]
struct ListenerState {
    tip: ChainTip,

    // Oldest entry at the front, the tip at the back.
    window: VecDeque<WindowEntry>,
}

/// Relays connected and disconnected blocks to the node core.
///
/// Blocks must be presented in chain order: connections strictly increasing, disconnections
/// strictly decreasing, one block per call and without gaps. The listener does not reorder or
/// validate beyond a warning and a debug assertion. Every notification goes to the channel-state
/// handler first and the chain-monitor handler second.
pub struct ChainSyncListener {
    core: NodeCoreHandles,
    reorg_window: usize,
    state: Mutex<ListenerState>,
}

impl fmt::Debug for ChainSyncListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSyncListener")
            .field("reorg_window", &self.reorg_window)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl ChainSyncListener {
    /// Creates a listener whose node core is synced up to `tip`.
    pub fn new(tip: ChainTip, reorg_window: usize, core: NodeCoreHandles) -> Self {
        info!(%tip, %reorg_window, "initializing chain sync listener");
        Self {
            core,
            reorg_window: reorg_window.max(1),
            state: Mutex::new(ListenerState {
                tip,
                window: VecDeque::with_capacity(reorg_window),
            }),
        }
    }

    /// The tip the node core has been told about.
    pub fn tip(&self) -> ChainTip {
        self.state.lock().tip
    }

    /// Number of connected blocks retained for unwinding reorgs.
    pub const fn reorg_window(&self) -> usize {
        self.reorg_window
    }

    /// The retained blocks, oldest first.
    pub fn recent_blocks(&self) -> Vec<WindowEntry> {
        self.state.lock().window.iter().copied().collect()
    }

    /// Connects `block` at `height` on top of the current tip.
    pub fn connect_block(&self, block: &Block, height: u32) {
        let hash = block.block_hash();
        {
            let mut state = self.state.lock();
            let expected = state.tip.height.wrapping_add(1);
            if height != expected {
                warn!(%height, %expected, %hash, "block connected out of order");
            }
            debug_assert_eq!(height, expected, "blocks must be connected in order");

            state.window.push_back(WindowEntry {
                height,
                hash,
                prev_hash: block.header.prev_blockhash,
            });
            while state.window.len() > self.reorg_window {
                state.window.pop_front();
            }
            state.tip = ChainTip::new(height, hash);
        }

        debug!(%height, %hash, "connecting block");
        self.core.channel_manager.block_connected(block, height);
        self.core.chain_monitor.block_connected(block, height);
    }

    /// Disconnects the tip at `height`.
    ///
    /// The new tip is at `height - 1`. Its hash is taken from the retained window, else from the
    /// disconnected header, and is unknown if neither has it.
    pub fn disconnect_block(&self, header: Option<&Header>, height: u32) {
        {
            let mut state = self.state.lock();
            if height != state.tip.height {
                warn!(%height, tip = %state.tip, "block disconnected out of order");
            }
            debug_assert_eq!(height, state.tip.height, "only the tip can be disconnected");

            let popped = match state.window.back() {
                Some(entry) if entry.height == height => state.window.pop_back(),
                _ => None,
            };

            let new_height = height.saturating_sub(1);
            let new_hash = state
                .window
                .back()
                .filter(|entry| entry.height == new_height)
                .map(|entry| entry.hash)
                .or_else(|| header.map(|h| h.prev_blockhash))
                .or_else(|| popped.map(|entry| entry.prev_hash));

            state.tip = match new_hash {
                Some(hash) => ChainTip::new(new_height, hash),
                None => {
                    warn!(height = %new_height, "hash of the new tip is unknown after disconnect");
                    ChainTip::unknown_hash(new_height)
                }
            };
        }

        debug!(%height, "disconnecting block");
        self.core.channel_manager.block_disconnected(header, height);
        self.core.chain_monitor.block_disconnected(header, height);
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{block, hashes::Hash, CompactTarget, TxMerkleNode};
    use proptest::prelude::*;

    use super::*;
    use crate::core::testing::{recording_core, Notification};

    fn child_of(prev_blockhash: BlockHash, nonce: u32) -> Block {
        Block {
            header: block::Header {
                version: block::Version::TWO,
                prev_blockhash,
                merkle_root: TxMerkleNode::all_zeros(),
                time: nonce,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce,
            },
            txdata: vec![],
        }
    }

    #[test]
    fn notifies_manager_before_monitor() {
        let (core, log) = recording_core();
        let listener = ChainSyncListener::new(ChainTip::unknown_hash(0), 6, core);
        let block = child_of(BlockHash::all_zeros(), 1);

        listener.connect_block(&block, 1);
        listener.disconnect_block(Some(&block.header), 1);

        assert_eq!(
            *log.lock(),
            vec![
                Notification::Connected { name: "manager", hash: block.block_hash(), height: 1 },
                Notification::Connected { name: "monitor", hash: block.block_hash(), height: 1 },
                Notification::Disconnected { name: "manager", height: 1 },
                Notification::Disconnected { name: "monitor", height: 1 },
            ]
        );
    }

    #[test]
    fn disconnect_restores_previous_hash() {
        let (core, _log) = recording_core();
        let listener = ChainSyncListener::new(ChainTip::unknown_hash(0), 6, core);
        let first = child_of(BlockHash::all_zeros(), 1);
        let second = child_of(first.block_hash(), 2);

        listener.connect_block(&first, 1);
        listener.connect_block(&second, 2);
        listener.disconnect_block(None, 2);

        assert_eq!(listener.tip(), ChainTip::new(1, first.block_hash()));
    }

    #[test]
    fn disconnect_beyond_window_falls_back_to_header() {
        let (core, _log) = recording_core();
        let listener = ChainSyncListener::new(ChainTip::unknown_hash(0), 1, core);
        let first = child_of(BlockHash::all_zeros(), 1);
        let second = child_of(first.block_hash(), 2);
        listener.connect_block(&first, 1);
        listener.connect_block(&second, 2);

        listener.disconnect_block(None, 2);
        assert_eq!(listener.tip().hash, first.block_hash());

        // Nothing left in the window and no header: the hash is unknown.
        listener.disconnect_block(None, 1);
        assert_eq!(listener.tip(), ChainTip::unknown_hash(0));
    }

    proptest! {
        #[test]
        fn tip_height_follows_connects_and_disconnects(ops in prop::collection::vec(any::<bool>(), 0..200)) {
            let (core, _log) = recording_core();
            let listener = ChainSyncListener::new(ChainTip::unknown_hash(0), DEFAULT_REORG_WINDOW, core);
            let mut stack: Vec<Block> = Vec::new();
            let mut nonce = 0;

            for connect in ops {
                if connect || stack.is_empty() {
                    nonce += 1;
                    let prev = stack.last().map(Block::block_hash).unwrap_or_else(BlockHash::all_zeros);
                    let block = child_of(prev, nonce);
                    listener.connect_block(&block, stack.len() as u32 + 1);
                    stack.push(block);
                } else {
                    let block = stack.pop().expect("not empty");
                    listener.disconnect_block(Some(&block.header), stack.len() as u32 + 1);
                }

                prop_assert_eq!(listener.tip().height, stack.len() as u32);
                if let Some(top) = stack.last() {
                    prop_assert_eq!(listener.tip().hash, top.block_hash());
                }
                prop_assert!(listener.recent_blocks().len() <= DEFAULT_REORG_WINDOW);
            }
        }
    }
}
