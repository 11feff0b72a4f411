//! The swap data model.
use std::{fmt, str::FromStr};

use bitcoin::{hashes::sha256, OutPoint, Txid};
use serde::{Deserialize, Serialize};

/// Lifecycle of a swap: `Idle → Opened → {Committed | Canceled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    /// Created but not yet agreed on.
    Idle,

    /// Preconditions checked and the swap persisted.
    Opened,

    /// Both legs completed. Terminal.
    Committed,

    /// Abandoned before completion. Terminal.
    Canceled,
}

impl SwapStatus {
    /// Whether no further transition is possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SwapStatus::Committed | SwapStatus::Canceled)
    }

    /// The stored representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Idle => "idle",
            SwapStatus::Opened => "opened",
            SwapStatus::Committed => "committed",
            SwapStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SwapStatus::Idle),
            "opened" => Ok(SwapStatus::Opened),
            "committed" => Ok(SwapStatus::Committed),
            "canceled" => Ok(SwapStatus::Canceled),
            other => Err(format!("unknown swap status {other}")),
        }
    }
}

/// The side of the protocol a coordinator runs. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapRole {
    /// Knows the preimage, receives on-chain, settles off-chain.
    Holder,

    /// Pays on-chain, learns the preimage off-chain.
    Seeker,
}

impl SwapRole {
    /// The stored representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SwapRole::Holder => "holder",
            SwapRole::Seeker => "seeker",
        }
    }
}

impl fmt::Display for SwapRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holder" => Ok(SwapRole::Holder),
            "seeker" => Ok(SwapRole::Seeker),
            other => Err(format!("unknown swap role {other}")),
        }
    }
}

/// What both parties agreed on, plus where the swap stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInfo {
    /// The hash commitment shared by both legs.
    pub hash: sha256::Hash,

    /// The on-chain address the Seeker pays into.
    pub counterparty_l1_address: String,

    /// Amount of both legs.
    pub amount_sat: u64,

    /// Current status.
    pub status: SwapStatus,
}

/// The durable form of a swap, keyed by [`SwapInfo::hash`].
///
/// Preimages are never stored. A Holder swap is resumed by supplying its preimage again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    /// The swap.
    pub info: SwapInfo,

    /// The local side of the swap.
    pub role: SwapRole,

    /// Chain tip height when the swap was opened. Only outputs confirmed above it pay the swap.
    pub opened_height: u32,

    /// The output the Holder accepted as payment. No other swap in the store can claim it.
    pub payment: Option<OutPoint>,

    /// The Seeker's on-chain payment, once sent.
    pub funding_txid: Option<Txid>,

    /// Set by the Seeker before asking the wallet to pay. With no `funding_txid` it means a
    /// payment may be out without its txid on record.
    pub send_pending: bool,

    /// Whether a commit was started. A record with this set may have a leg in flight.
    pub commit_started: bool,
}
