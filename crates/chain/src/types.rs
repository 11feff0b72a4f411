//! Data exchanged with a [`ChainSource`](crate::ChainSource).

use std::fmt;

use bitcoin::{hashes::Hash, Amount, BlockHash, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

/// The highest block currently known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTip {
    /// Height of the tip block.
    pub height: u32,

    /// Hash of the tip block.
    pub hash: BlockHash,
}

impl ChainTip {
    /// Creates a new [`ChainTip`].
    pub const fn new(height: u32, hash: BlockHash) -> Self {
        Self { height, hash }
    }

    /// A tip whose hash could not be determined, e.g. after rolling back a block whose parent was
    /// never observed.
    pub fn unknown_hash(height: u32) -> Self {
        Self {
            height,
            hash: BlockHash::all_zeros(),
        }
    }

    /// Whether the hash of this tip is known.
    pub fn is_hash_known(&self) -> bool {
        self.hash != BlockHash::all_zeros()
    }
}

impl fmt::Display for ChainTip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.height)
    }
}

/// Structured result of decoding a script, as reported by `decodescript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedScript {
    /// Script disassembly.
    pub asm: String,

    /// Output script type, e.g. `witness_v0_keyhash`.
    #[serde(rename = "type")]
    pub script_type: String,

    /// Address the script pays to, when it is standard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Inferred descriptor for the script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,

    /// Address of the P2SH wrapping of this script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2sh: Option<String>,
}

/// Analysis of an output descriptor, as reported by `getdescriptorinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    /// The descriptor in canonical form, without private keys, including its checksum.
    pub descriptor: String,

    /// Checksum of the input descriptor.
    pub checksum: String,

    /// Whether the descriptor is ranged.
    #[serde(rename = "isrange")]
    pub is_range: bool,

    /// Whether the descriptor is solvable.
    #[serde(rename = "issolvable")]
    pub is_solvable: bool,

    /// Whether the input descriptor contained at least one private key.
    #[serde(rename = "hasprivatekeys")]
    pub has_private_keys: bool,
}

/// A single unspent output found by a UTXO-set scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedUtxo {
    /// Transaction that created the output.
    pub txid: Txid,

    /// Index of the output in that transaction.
    pub vout: u32,

    /// Locking script of the output.
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptBuf,

    /// Value of the output.
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub amount: Amount,

    /// Height of the block containing the output.
    pub height: u32,
}

impl ScannedUtxo {
    /// Number of confirmations this output has with `tip_height` as the chain tip.
    pub const fn confirmations(&self, tip_height: u32) -> u32 {
        if tip_height < self.height {
            0
        } else {
            tip_height - self.height + 1
        }
    }
}

/// Result set of a UTXO-set scan, as reported by `scantxoutset start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoScan {
    /// Whether the scan completed.
    pub success: bool,

    /// Height of the chain tip at which the scan ran.
    pub height: u32,

    /// Hash of the chain tip at which the scan ran.
    #[serde(rename = "bestblock")]
    pub best_block: BlockHash,

    /// The unspent outputs matching the descriptor.
    pub unspents: Vec<ScannedUtxo>,

    /// Sum of all matching outputs.
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub total_amount: Amount,
}

/// Builds the `addr(...)` descriptor (without checksum) that matches outputs paying `address`.
pub fn addr_descriptor(address: &str) -> String {
    format!("addr({address})")
}
