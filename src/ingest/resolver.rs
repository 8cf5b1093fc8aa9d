//! Transaction resolver: turns an admitted signature into a fully
//! resolved transaction record via the JSON-RPC `getTransaction` call.
//!
//! Transport errors and not-yet-indexed lookups are retried a bounded
//! number of times with backoff, then logged and dropped by the caller.
//! Malformed payloads are never retried; unrelated transactions hit that
//! path all the time, so they log at debug only.

use crate::ingest::backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use solana_pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub enum ResolveError {
    /// Network or RPC-level failure. Retried with backoff.
    Transport(String),
    /// The node does not (yet) know the signature. Retried with backoff.
    NotFound,
    /// Unexpected account layout or missing balances. Not retried.
    Malformed(String),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ResolveError::NotFound => write!(f, "Transaction not found"),
            ResolveError::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
        }
    }
}

impl std::error::Error for ResolveError {}

impl ResolveError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Transport(_) | ResolveError::NotFound)
    }
}

/// One compiled instruction, accounts given as indices into the
/// transaction account list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
    pub data: String,
}

/// Token balance snapshot for one account, before or after execution.
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub amount_raw: u64,
    pub ui_amount: f64,
    pub decimals: u8,
}

/// A fully resolved transaction. Immutable once constructed; owned by the
/// decoding stage and discarded after an event is derived.
#[derive(Debug, Clone)]
pub struct ResolvedTransaction {
    pub signature: String,
    pub slot: u64,
    pub account_keys: Vec<Pubkey>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    /// Outer instructions followed by inner (CPI) instructions, in order.
    pub instructions: Vec<CompiledInstruction>,
    pub success: bool,
    pub block_time: Option<DateTime<Utc>>,
}

// --- Wire schema (the subset of getTransaction we consume) ---

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcTransaction>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<RpcMeta>,
    transaction: RpcPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    err: Option<serde_json::Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Option<Vec<RpcTokenBalance>>,
    #[serde(default)]
    post_token_balances: Option<Vec<RpcTokenBalance>>,
    #[serde(default)]
    inner_instructions: Option<Vec<RpcInnerInstructions>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTokenBalance {
    account_index: usize,
    mint: String,
    ui_token_amount: RpcUiTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcUiTokenAmount {
    amount: String,
    decimals: u8,
    ui_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RpcInnerInstructions {
    #[serde(default)]
    #[allow(dead_code)]
    index: u8,
    instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Deserialize)]
struct RpcPayload {
    signatures: Vec<String>,
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<String>,
    instructions: Vec<CompiledInstruction>,
}

fn convert_token_balances(balances: Option<Vec<RpcTokenBalance>>) -> Vec<TokenBalance> {
    balances
        .unwrap_or_default()
        .into_iter()
        .map(|b| TokenBalance {
            account_index: b.account_index,
            mint: b.mint,
            amount_raw: b.ui_token_amount.amount.parse::<u64>().unwrap_or(0),
            ui_amount: b.ui_token_amount.ui_amount.unwrap_or(0.0),
            decimals: b.ui_token_amount.decimals,
        })
        .collect()
}

fn convert(rpc: RpcTransaction) -> Result<ResolvedTransaction, ResolveError> {
    let meta = rpc
        .meta
        .ok_or_else(|| ResolveError::Malformed("missing meta".to_string()))?;

    let signature = rpc
        .transaction
        .signatures
        .first()
        .cloned()
        .ok_or_else(|| ResolveError::Malformed("no signatures".to_string()))?;

    if rpc.transaction.message.account_keys.is_empty() {
        return Err(ResolveError::Malformed("no account keys".to_string()));
    }

    if meta.pre_balances.is_empty() || meta.post_balances.is_empty() {
        return Err(ResolveError::Malformed("missing balances".to_string()));
    }

    let account_keys = rpc
        .transaction
        .message
        .account_keys
        .iter()
        .map(|k| Pubkey::from_str(k))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ResolveError::Malformed(format!("bad account key: {}", e)))?;

    let mut instructions = rpc.transaction.message.instructions;
    for inner in meta.inner_instructions.unwrap_or_default() {
        instructions.extend(inner.instructions);
    }

    Ok(ResolvedTransaction {
        signature,
        slot: rpc.slot,
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances: convert_token_balances(meta.pre_token_balances),
        post_token_balances: convert_token_balances(meta.post_token_balances),
        instructions,
        success: meta.err.is_none(),
        block_time: rpc
            .block_time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
    })
}

pub struct TransactionResolver {
    client: reqwest::Client,
    rpc_url: String,
    max_retries: u32,
}

impl TransactionResolver {
    pub fn new(rpc_url: &str) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            max_retries: 3,
        })
    }

    /// Fetch and convert one transaction, retrying transient failures.
    pub async fn resolve(&self, signature: &str) -> Result<ResolvedTransaction, ResolveError> {
        let mut backoff = ExponentialBackoff::new(500, 5_000, self.max_retries);

        loop {
            match self.fetch_once(signature).await {
                Ok(tx) => return Ok(tx),
                Err(e) if e.is_retryable() => {
                    log::debug!("Lookup failed for {}: {}", &signature[..signature.len().min(16)], e);
                    if backoff.sleep().await.is_err() {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, signature: &str) -> Result<ResolvedTransaction, ResolveError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "json",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }
            ]
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ResolveError::Transport(format!(
                "RPC status {}",
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ResolveError::Transport(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        let rpc_tx = body.result.ok_or(ResolveError::NotFound)?;
        convert(rpc_tx)
    }
}
