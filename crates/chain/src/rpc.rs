//! [`ChainSource`] implementation backed by Bitcoin Core's JSON-RPC interface.
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bitcoin::{
    consensus::encode::{deserialize_hex, serialize_hex},
    Block, BlockHash, Script, Transaction, Txid,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use swapline_common::retry::{retry_with_backoff_when, RetryConfig};
use tracing::{debug, trace, warn};

use crate::{
    config::BitcoindConfig,
    errors::{ChainIOError, ChainResult},
    source::{ChainSource, Miner},
    types::{DecodedScript, DescriptorInfo, UtxoScan},
};

/// Envelope of a JSON-RPC 1.0 response.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Bitcoin Core JSON-RPC client.
#[derive(Debug)]
pub struct BitcoindRpc {
    http: reqwest::Client,
    url: String,
    user: String,
    pass: String,
    retry: RetryConfig,
    next_id: AtomicU64,
}

impl BitcoindRpc {
    /// Creates a new client. No request is made until the first call.
    pub fn new(config: &BitcoindConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainIOError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
            retry: config.retry.clone(),
            next_id: AtomicU64::new(0),
        })
    }

    /// Performs a single call without retries.
    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[Value],
    ) -> ChainResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(%method, %id, ?params, "sending rpc request");

        let response = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainIOError::Transport(e.to_string()))?;

        // bitcoind reports RPC errors with a non-2xx status but still a JSON body, so the status
        // code is only looked at when the body cannot be decoded.
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainIOError::Transport(e.to_string()))?;

        let decoded: RpcResponse<T> = serde_json::from_str(&text).map_err(|e| {
            if status.is_server_error() || status.is_client_error() {
                ChainIOError::Transport(format!("http status {status}: {text}"))
            } else {
                ChainIOError::Malformed(format!("{method}: {e}"))
            }
        })?;

        match (decoded.result, decoded.error) {
            (_, Some(err)) => {
                debug!(%method, code = err.code, message = %err.message, "rpc call returned an error");
                Err(ChainIOError::from_rpc(err.code, err.message))
            }
            (Some(result), None) => Ok(result),
            (None, None) => Err(ChainIOError::Malformed(format!("{method}: empty result"))),
        }
    }

    /// Performs a call, retrying transport failures according to the configured policy.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> ChainResult<T> {
        retry_with_backoff_when(method, &self.retry, ChainIOError::is_transient, || {
            self.call_once(method, &params)
        })
        .await
    }
}

#[async_trait]
impl ChainSource for BitcoindRpc {
    async fn chaintip_height(&self) -> ChainResult<u32> {
        self.call("getblockcount", vec![]).await
    }

    async fn chaintip_hash(&self) -> ChainResult<BlockHash> {
        self.call("getbestblockhash", vec![]).await
    }

    async fn submit_transaction(&self, tx: &Transaction) -> ChainResult<Txid> {
        let txid = self
            .call_once("sendrawtransaction", &[json!(serialize_hex(tx))])
            .await;
        if let Err(e) = &txid {
            warn!(txid = %tx.compute_txid(), %e, "sendrawtransaction failed");
        }
        txid
    }

    async fn get_transaction(&self, txid: &Txid) -> ChainResult<Transaction> {
        let raw: String = self
            .call("getrawtransaction", vec![json!(txid), json!(false)])
            .await?;
        deserialize_hex(&raw).map_err(|e| ChainIOError::Malformed(format!("transaction: {e}")))
    }

    async fn decode_script(&self, script: &Script) -> ChainResult<DecodedScript> {
        self.call("decodescript", vec![json!(script.to_hex_string())])
            .await
    }

    async fn descriptor_info(&self, descriptor: &str) -> ChainResult<DescriptorInfo> {
        self.call("getdescriptorinfo", vec![json!(descriptor)]).await
    }

    async fn scan_utxo_set(&self, descriptor: &str) -> ChainResult<UtxoScan> {
        self.call("scantxoutset", vec![json!("start"), json!([descriptor])])
            .await
    }

    async fn block_hash(&self, height: u32) -> ChainResult<BlockHash> {
        self.call("getblockhash", vec![json!(height)]).await
    }

    async fn block(&self, hash: &BlockHash) -> ChainResult<Block> {
        let raw: String = self.call("getblock", vec![json!(hash), json!(0)]).await?;
        deserialize_hex(&raw).map_err(|e| ChainIOError::Malformed(format!("block: {e}")))
    }
}

#[async_trait]
impl Miner for BitcoindRpc {
    async fn mine_blocks(&self, count: u32, address: &str) -> ChainResult<Vec<BlockHash>> {
        self.call_once("generatetoaddress", &[json!(count), json!(address)])
            .await
    }
}
