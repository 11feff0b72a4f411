//! Small builders for addresses and transactions.
use bitcoin::{
    absolute::LockTime, hashes::Hash, transaction, Address, Amount, KnownHrp, OutPoint, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

/// A deterministic regtest P2WSH address. Distinct tags give distinct addresses.
pub fn regtest_address(tag: u8) -> Address {
    Address::p2wsh(&ScriptBuf::from_bytes(vec![tag]), KnownHrp::Regtest)
}

/// A txid whose bytes are all `byte`.
pub fn txid_from_byte(byte: u8) -> Txid {
    Txid::from_byte_array([byte; 32])
}

/// Creates a transaction spending `inputs` into `outputs`.
pub fn create_tx(inputs: Vec<OutPoint>, outputs: Vec<(ScriptBuf, Amount)>) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .into_iter()
            .map(|previous_output| TxIn {
                previous_output,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .into_iter()
            .map(|(script_pubkey, value)| TxOut {
                value,
                script_pubkey,
            })
            .collect(),
    }
}

/// A transaction that spends `outpoint` entirely into a single output locked by `script`.
pub fn spending_tx(outpoint: OutPoint, script: ScriptBuf, value: Amount) -> Transaction {
    create_tx(vec![outpoint], vec![(script, value)])
}

/// A transaction funded by a synthetic input that pays `value` to `script`.
///
/// `seed` chooses the synthetic input and therefore the txid.
pub fn funding_tx(seed: u8, script: ScriptBuf, value: Amount) -> Transaction {
    spending_tx(OutPoint::new(txid_from_byte(seed), 0), script, value)
}
