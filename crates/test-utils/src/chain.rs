//! An in-memory blockchain.
use std::collections::HashSet;

use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime,
    address::NetworkUnchecked,
    block,
    hashes::{sha256, Hash},
    script::Builder,
    transaction, Address, Amount, Block, BlockHash, CompactTarget, Network, OutPoint, Script,
    ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
};
use parking_lot::Mutex;
use swapline_chain::{
    types::ScannedUtxo, ChainIOError, ChainResult, ChainSource, ChainTip, DecodedScript,
    DescriptorInfo, Miner, UtxoScan,
};

use crate::fixtures::create_tx;

/// Value of every coinbase output.
pub const COINBASE_VALUE: Amount = Amount::from_sat(50 * 100_000_000);

/// Regtest's proof-of-work limit in compact form.
const REGTEST_BITS: u32 = 0x207f_ffff;

const GENESIS_TIME: u32 = 1_296_688_602;

/// `RPC_INVALID_ADDRESS_OR_KEY`, the code `bitcoind` uses for descriptors it cannot parse.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Debug)]
struct State {
    blocks: Vec<Block>,
    mempool: Vec<Transaction>,
    submitted: Vec<Txid>,
    nonce: u32,
    funding_counter: u32,
    failing_submissions: usize,
    offline: bool,
}

/// An in-memory regtest chain.
///
/// Blocks are only built when asked for through [`MockChain::mine`] or [`Miner::mine_blocks`].
/// Every block carries the whole mempool. Proof of work is not checked.
#[derive(Debug)]
pub struct MockChain {
    network: Network,
    state: Mutex<State>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Creates a chain containing only a genesis block at height 0.
    pub fn new() -> Self {
        let mut state = State {
            blocks: Vec::new(),
            mempool: Vec::new(),
            submitted: Vec::new(),
            nonce: 0,
            funding_counter: 0,
            failing_submissions: 0,
            offline: false,
        };
        let genesis = build_block(&mut state, ScriptBuf::new());
        state.blocks.push(genesis);

        Self {
            network: Network::Regtest,
            state: Mutex::new(state),
        }
    }

    /// The network addresses are checked against.
    pub const fn network(&self) -> Network {
        self.network
    }

    /// The current tip.
    pub fn tip(&self) -> ChainTip {
        let state = self.state.lock();
        tip_of(&state)
    }

    /// The block at `height` on the current chain, if any.
    pub fn block_at(&self, height: u32) -> Option<Block> {
        self.state.lock().blocks.get(height as usize).cloned()
    }

    /// Mines `count` blocks whose coinbase pays to an empty script.
    pub fn mine(&self, count: u32) -> Vec<BlockHash> {
        self.mine_to(count, ScriptBuf::new())
    }

    /// Mines `count` blocks whose coinbase pays to `script`.
    pub fn mine_to(&self, count: u32, script: ScriptBuf) -> Vec<BlockHash> {
        let mut state = self.state.lock();
        (0..count)
            .map(|_| {
                let block = build_block(&mut state, script.clone());
                let hash = block.block_hash();
                state.blocks.push(block);
                hash
            })
            .collect()
    }

    /// Removes the top `depth` blocks. Their non-coinbase transactions go back to the mempool, so
    /// the next mined block confirms them again on the new branch.
    ///
    /// The genesis block is never removed.
    pub fn reorg(&self, depth: usize) -> Vec<Block> {
        let mut state = self.state.lock();
        let keep = state.blocks.len().saturating_sub(depth).max(1);
        let removed = state.blocks.split_off(keep);

        let mut returned: Vec<Transaction> = removed
            .iter()
            .flat_map(|b| b.txdata.iter().skip(1).cloned())
            .collect();
        returned.append(&mut state.mempool);
        state.mempool = returned;

        removed
    }

    /// Puts a transaction paying `amount` to `address` in the mempool and returns its txid.
    pub fn send(&self, amount: Amount, address: &Address) -> Txid {
        let mut state = self.state.lock();
        state.funding_counter += 1;
        let mut seed = [0xfe; 32];
        seed[..4].copy_from_slice(&state.funding_counter.to_be_bytes());
        let tx = create_tx(
            vec![OutPoint::new(Txid::from_byte_array(seed), 0)],
            vec![(address.script_pubkey(), amount)],
        );
        let txid = tx.compute_txid();
        state.mempool.push(tx);
        txid
    }

    /// Puts an arbitrary transaction in the mempool.
    pub fn add_to_mempool(&self, tx: Transaction) -> Txid {
        let txid = tx.compute_txid();
        self.state.lock().mempool.push(tx);
        txid
    }

    /// Txids accepted through [`ChainSource::submit_transaction`], in submission order.
    pub fn submitted(&self) -> Vec<Txid> {
        self.state.lock().submitted.clone()
    }

    /// Makes the next `n` submissions fail with a transport error.
    pub fn fail_next_submissions(&self, n: usize) {
        self.state.lock().failing_submissions = n;
    }

    /// While offline, every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    fn check_online(&self) -> ChainResult<()> {
        if self.state.lock().offline {
            Err(ChainIOError::Transport("mock chain is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn parse_address(&self, address: &str) -> ChainResult<Address> {
        address
            .parse::<Address<NetworkUnchecked>>()
            .ok()
            .and_then(|a| a.require_network(self.network).ok())
            .ok_or_else(|| ChainIOError::Rpc {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: format!("invalid address: {address}"),
            })
    }

    /// Parses an `addr(...)` descriptor, with or without a checksum.
    fn parse_addr_descriptor(&self, descriptor: &str) -> ChainResult<Address> {
        let body = descriptor.split('#').next().unwrap_or(descriptor);
        let inner = body
            .strip_prefix("addr(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ChainIOError::Rpc {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: format!("unsupported descriptor: {descriptor}"),
            })?;
        self.parse_address(inner)
    }
}

fn tip_of(state: &State) -> ChainTip {
    let height = state.blocks.len().saturating_sub(1) as u32;
    let hash = state
        .blocks
        .last()
        .map(Block::block_hash)
        .unwrap_or_else(BlockHash::all_zeros);
    ChainTip::new(height, hash)
}

fn build_block(state: &mut State, coinbase_script: ScriptBuf) -> Block {
    let height = state.blocks.len() as u32;
    let prev_blockhash = state
        .blocks
        .last()
        .map(Block::block_hash)
        .unwrap_or_else(BlockHash::all_zeros);
    state.nonce += 1;

    // Height first, then the nonce so that blocks rebuilt at the same height after a reorg get a
    // different coinbase.
    let script_sig = Builder::new()
        .push_int(i64::from(height))
        .push_int(i64::from(state.nonce))
        .into_script();
    let coinbase = Transaction {
        version: transaction::Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: COINBASE_VALUE,
            script_pubkey: coinbase_script,
        }],
    };

    let mut txdata = vec![coinbase];
    txdata.append(&mut state.mempool);

    let mut block = Block {
        header: block::Header {
            version: block::Version::TWO,
            prev_blockhash,
            merkle_root: TxMerkleNode::all_zeros(),
            time: GENESIS_TIME + height * 600,
            bits: CompactTarget::from_consensus(REGTEST_BITS),
            nonce: state.nonce,
        },
        txdata,
    };
    if let Some(root) = block.compute_merkle_root() {
        block.header.merkle_root = root;
    }
    block
}

fn script_type(script: &Script) -> &'static str {
    if script.is_p2wpkh() {
        "witness_v0_keyhash"
    } else if script.is_p2wsh() {
        "witness_v0_scripthash"
    } else if script.is_p2tr() {
        "witness_v1_taproot"
    } else if script.is_p2pkh() {
        "pubkeyhash"
    } else if script.is_p2sh() {
        "scripthash"
    } else if script.is_op_return() {
        "nulldata"
    } else {
        "nonstandard"
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn chaintip_height(&self) -> ChainResult<u32> {
        self.check_online()?;
        Ok(self.tip().height)
    }

    async fn chaintip_hash(&self) -> ChainResult<BlockHash> {
        self.check_online()?;
        Ok(self.tip().hash)
    }

    async fn submit_transaction(&self, tx: &Transaction) -> ChainResult<Txid> {
        self.check_online()?;
        let mut state = self.state.lock();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(ChainIOError::Transport("injected submission failure".to_string()));
        }

        let txid = tx.compute_txid();
        if !state.mempool.iter().any(|t| t.compute_txid() == txid) {
            state.mempool.push(tx.clone());
        }
        state.submitted.push(txid);
        Ok(txid)
    }

    async fn get_transaction(&self, txid: &Txid) -> ChainResult<Transaction> {
        self.check_online()?;
        let state = self.state.lock();
        state
            .mempool
            .iter()
            .chain(state.blocks.iter().flat_map(|b| b.txdata.iter()))
            .find(|tx| tx.compute_txid() == *txid)
            .cloned()
            .ok_or_else(|| ChainIOError::NotFound(format!("transaction {txid}")))
    }

    async fn decode_script(&self, script: &Script) -> ChainResult<DecodedScript> {
        self.check_online()?;
        let address = Address::from_script(script, self.network).ok();
        let p2sh = if script.is_p2sh() {
            None
        } else {
            Address::p2sh(script, self.network).ok().map(|a| a.to_string())
        };

        Ok(DecodedScript {
            asm: script.to_asm_string(),
            script_type: script_type(script).to_string(),
            desc: address.as_ref().map(|a| format!("addr({a})")),
            address: address.map(|a| a.to_string()),
            p2sh,
        })
    }

    async fn descriptor_info(&self, descriptor: &str) -> ChainResult<DescriptorInfo> {
        self.check_online()?;
        self.parse_addr_descriptor(descriptor)?;
        let body = descriptor.split('#').next().unwrap_or(descriptor);
        let checksum = sha256::Hash::hash(body.as_bytes()).to_string()[..8].to_string();

        Ok(DescriptorInfo {
            descriptor: format!("{body}#{checksum}"),
            checksum,
            is_range: false,
            is_solvable: false,
            has_private_keys: false,
        })
    }

    async fn scan_utxo_set(&self, descriptor: &str) -> ChainResult<UtxoScan> {
        self.check_online()?;
        let script = self.parse_addr_descriptor(descriptor)?.script_pubkey();
        let state = self.state.lock();

        let spent: HashSet<OutPoint> = state
            .blocks
            .iter()
            .flat_map(|b| b.txdata.iter())
            .flat_map(|tx| tx.input.iter().map(|i| i.previous_output))
            .collect();

        let mut unspents = Vec::new();
        for (height, block) in state.blocks.iter().enumerate() {
            for tx in &block.txdata {
                let txid = tx.compute_txid();
                for (vout, out) in tx.output.iter().enumerate() {
                    let outpoint = OutPoint::new(txid, vout as u32);
                    if out.script_pubkey == script && !spent.contains(&outpoint) {
                        unspents.push(ScannedUtxo {
                            txid,
                            vout: vout as u32,
                            script_pub_key: out.script_pubkey.clone(),
                            amount: out.value,
                            height: height as u32,
                        });
                    }
                }
            }
        }

        let tip = tip_of(&state);
        Ok(UtxoScan {
            success: true,
            height: tip.height,
            best_block: tip.hash,
            total_amount: unspents.iter().map(|u| u.amount).sum(),
            unspents,
        })
    }

    async fn block_hash(&self, height: u32) -> ChainResult<BlockHash> {
        self.check_online()?;
        self.block_at(height)
            .map(|b| b.block_hash())
            .ok_or_else(|| ChainIOError::NotFound(format!("block height {height}")))
    }

    async fn block(&self, hash: &BlockHash) -> ChainResult<Block> {
        self.check_online()?;
        self.state
            .lock()
            .blocks
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| ChainIOError::NotFound(format!("block {hash}")))
    }
}

#[async_trait]
impl Miner for MockChain {
    async fn mine_blocks(&self, count: u32, address: &str) -> ChainResult<Vec<BlockHash>> {
        self.check_online()?;
        let script = self.parse_address(address)?.script_pubkey();
        Ok(self.mine_to(count, script))
    }
}
