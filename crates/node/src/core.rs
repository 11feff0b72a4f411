//! Boundary to the node core.
//!
//! The node core is made of two cooperating handlers that both need to see every block: the
//! channel-state handler (the channel manager) and the chain-monitor handler (which watches
//! commitment outputs). Both receive blocks through [`BlockListener`].
use std::sync::Arc;

use bitcoin::{block::Header, Block};

/// Receives block connections and disconnections.
///
/// Implementations must not fail: a node core that cannot process a block is in a state the
/// integration layer cannot recover from, and is expected to abort on its own.
pub trait BlockListener: Send + Sync {
    /// A block was connected at `height` on top of the previous tip.
    fn block_connected(&self, block: &Block, height: u32);

    /// The tip at `height` was disconnected. The header is absent when the block was never seen.
    fn block_disconnected(&self, header: Option<&Header>, height: u32);
}

/// The two handlers of the node core that consume block notifications, in notification order.
#[derive(Clone)]
pub struct NodeCoreHandles {
    /// The channel-state handler. Notified first.
    pub channel_manager: Arc<dyn BlockListener>,

    /// The chain-monitor handler. Notified second.
    pub chain_monitor: Arc<dyn BlockListener>,
}

impl std::fmt::Debug for NodeCoreHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCoreHandles").finish_non_exhaustive()
    }
}
