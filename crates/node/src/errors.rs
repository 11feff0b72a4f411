//! Error types of the node integration layer.

use bitcoin::{BlockHash, ScriptBuf};
use swapline_chain::ChainIOError;
use thiserror::Error;

use crate::events::NodeEvent;

/// Errors that can occur while persisting node state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The underlying storage failed.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A manager write failed permanently. Channel state must not be extended until a manager
    /// write succeeds again.
    #[error("persister is degraded after a failed manager write")]
    Degraded,

    /// The blocking task doing the write panicked or was cancelled.
    #[error("persistence task failed: {0}")]
    Join(String),
}

/// Errors raised by the [`ChainFilter`](crate::filter::ChainFilter).
#[derive(Debug, Error)]
pub enum FilterError {
    /// Neither a txid nor a non-empty script was given.
    #[error("watch request needs a txid or a non-empty script")]
    EmptyWatch,

    /// The hinted block could not be fetched.
    #[error("could not fetch block {hash}: {source}")]
    HintedBlock {
        /// The hinted block.
        hash: BlockHash,

        /// Why the fetch failed.
        #[source]
        source: ChainIOError,
    },
}

/// Errors raised while syncing the chain.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The chain source could not be read.
    #[error("chain source: {0}")]
    Chain(#[from] ChainIOError),

    /// The local chain diverges from the remote chain by more blocks than are retained.
    #[error("reorg deeper than {window} blocks")]
    ReorgTooDeep {
        /// The number of blocks kept for fork detection.
        window: usize,
    },
}

/// Returned when an event is offered to a tracker whose consumer has stopped.
#[derive(Debug, Error)]
#[error("event queue closed")]
pub struct EventQueueClosed(pub NodeEvent);

/// Raw failure categories reported by the node core's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCoreError {
    /// The API was used incorrectly.
    ApiMisuse(String),

    /// No usable route was found or the route was invalid.
    RouteError(String),

    /// The channel is closing, closed or otherwise unusable.
    ChannelUnavailable(String),

    /// The requested feerate exceeds the allowed maximum.
    FeeRateTooHigh {
        /// Description of the failure.
        err: String,

        /// The offending feerate, in sat per 1000 weight units.
        feerate: u32,
    },

    /// A monitor update is in flight. Not an error for callers of the application.
    MonitorUpdateInProgress,

    /// The counterparty's shutdown script is not acceptable.
    IncompatibleShutdownScript(ScriptBuf),
}

/// The protocol error taxonomy exposed to the application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The node core API was misused.
    #[error("api misuse: {0}")]
    ApiMisuse(String),

    /// The payment route is invalid.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// The channel cannot be used.
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The fee is too high.
    #[error("fee too high: {0}")]
    FeeTooHigh(String),

    /// The shutdown script is incompatible.
    #[error("incompatible shutdown script: {0}")]
    IncompatibleShutdownScript(String),

    /// Anything that does not map onto a category above.
    #[error("unknown protocol error: {0}")]
    Unknown(String),
}

impl From<NodeCoreError> for ProtocolError {
    fn from(err: NodeCoreError) -> Self {
        match err {
            NodeCoreError::ApiMisuse(e) => ProtocolError::ApiMisuse(e),
            NodeCoreError::RouteError(e) => ProtocolError::InvalidRoute(e),
            NodeCoreError::ChannelUnavailable(e) => ProtocolError::ChannelUnavailable(e),
            NodeCoreError::FeeRateTooHigh { err, feerate } => {
                ProtocolError::FeeTooHigh(format!("{err} (feerate {feerate})"))
            }
            NodeCoreError::IncompatibleShutdownScript(script) => {
                ProtocolError::IncompatibleShutdownScript(script.to_hex_string())
            }
            NodeCoreError::MonitorUpdateInProgress => {
                ProtocolError::Unknown("monitor update in progress".to_string())
            }
        }
    }
}
