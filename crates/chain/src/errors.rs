//! Error types for talking to a chain source.

use thiserror::Error;

/// Bitcoin Core's `RPC_INVALID_ADDRESS_OR_KEY`, returned for unknown transactions and blocks.
pub(crate) const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// Bitcoin Core's `RPC_INVALID_PARAMETER`, returned for out-of-range block heights.
pub(crate) const RPC_INVALID_PARAMETER: i64 = -8;

/// Everything that can go wrong while reading from or submitting to a chain source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIOError {
    /// The chain source could not be reached.
    #[error("chain source unreachable: {0}")]
    Transport(String),

    /// The chain source answered with an error.
    #[error("chain source rejected the call with code {code}: {message}")]
    Rpc {
        /// The error code reported by the chain source.
        code: i64,

        /// The human readable error message.
        message: String,
    },

    /// The response could not be decoded into the expected type.
    #[error("malformed chain source response: {0}")]
    Malformed(String),

    /// The requested block, transaction or height does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ChainIOError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only transport failures are transient. An RPC error or a malformed response will repeat
    /// itself.
    pub const fn is_transient(&self) -> bool {
        matches!(self, ChainIOError::Transport(_))
    }

    /// Maps a JSON-RPC error object onto the taxonomy.
    pub(crate) fn from_rpc(code: i64, message: String) -> Self {
        match code {
            RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER => ChainIOError::NotFound(message),
            _ => ChainIOError::Rpc { code, message },
        }
    }
}

/// Result alias for chain source calls.
pub type ChainResult<T> = Result<T, ChainIOError>;
