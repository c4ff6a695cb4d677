pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use solana_sdk::native_token::lamports_to_sol;

use crate::error::{EngineError, is_retryable_message};

pub use types::{
    BlockhashInfo, Commitment, RpcResponse, SendOpts, SignatureInfo, SignatureStatus,
    SystemTransfer,
};

/// Typed view over a Solana RPC node. All methods are idempotent from the
/// client side; none retries internally — retry policy belongs to the
/// Tx Executor.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_sol_balance(&self, address: &str) -> Result<f64, EngineError>;

    /// Token balance for `owner` in whole tokens (scaled by mint decimals).
    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<f64, EngineError>;

    async fn latest_blockhash(&self, commitment: Commitment)
    -> Result<BlockhashInfo, EngineError>;

    /// Broadcast a serialized transaction; returns the signature.
    async fn send_raw_transaction(
        &self,
        serialized: &[u8],
        opts: SendOpts,
    ) -> Result<String, EngineError>;

    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, EngineError>;

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, EngineError>;

    /// Confirm a signature against the blockhash it was signed with. Polls
    /// every 2 s; fails with `StaleBlockhash` when the chain passes
    /// `last_valid_block_height`, or after 60 s.
    async fn confirm_transaction(
        &self,
        signature: &str,
        blockhash: &BlockhashInfo,
        commitment: Commitment,
    ) -> Result<(), EngineError>;

    /// Most recent signatures touching an address, newest first.
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, EngineError>;

    /// System-program transfers inside a confirmed transaction, in
    /// instruction order.
    async fn transaction_transfers(
        &self,
        signature: &str,
    ) -> Result<Vec<SystemTransfer>, EngineError>;
}

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONFIRM_CEILING: Duration = Duration::from_secs(60);

/// Production client: JSON-RPC 2.0 over a shared reqwest client.
pub struct ChainClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(endpoint: &str) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EngineError::Config(format!("building rpc client: {e}")))?;
        Ok(ChainClient { http, endpoint: endpoint.to_string(), next_id: AtomicU64::new(1) })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, EngineError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EngineError::RateLimited(format!("{method}: HTTP 429")));
        }
        if status.is_server_error() {
            return Err(EngineError::Transient(format!("{method}: HTTP {status}")));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("{method}: decoding response: {e}")))?;

        if let Some(err) = envelope.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(classify_rpc_error(method, &message));
        }

        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| EngineError::Transient(format!("{method}: missing result")))?;
        serde_json::from_value(result)
            .map_err(|e| EngineError::Other(format!("{method}: unexpected result shape: {e}")))
    }
}

/// RPC-level errors: retryable ones keep their transient kind, everything
/// else is an on-chain fatal for this attempt.
fn classify_rpc_error(method: &str, message: &str) -> EngineError {
    let tagged = format!("{method}: {message}");
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("too many requests") {
        EngineError::RateLimited(tagged)
    } else if lower.contains("blockhash not found") {
        EngineError::StaleBlockhash(tagged)
    } else if is_retryable_message(message) {
        EngineError::Transient(tagged)
    } else {
        EngineError::OnChain(tagged)
    }
}

#[async_trait]
impl ChainRpc for ChainClient {
    async fn get_sol_balance(&self, address: &str) -> Result<f64, EngineError> {
        let response: RpcResponse<u64> = self
            .call("getBalance", json!([address, {"commitment": "confirmed"}]))
            .await?;
        Ok(lamports_to_sol(response.value))
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<f64, EngineError> {
        let response: RpcResponse<Value> = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, {"mint": mint}, {"encoding": "jsonParsed", "commitment": "confirmed"}]),
            )
            .await?;
        Ok(sum_token_accounts(&response.value))
    }

    async fn latest_blockhash(
        &self,
        commitment: Commitment,
    ) -> Result<BlockhashInfo, EngineError> {
        let response: RpcResponse<BlockhashInfo> = self
            .call("getLatestBlockhash", json!([{"commitment": commitment.as_str()}]))
            .await?;
        Ok(response.value)
    }

    async fn send_raw_transaction(
        &self,
        serialized: &[u8],
        opts: SendOpts,
    ) -> Result<String, EngineError> {
        let encoded = BASE64.encode(serialized);
        self.call(
            "sendTransaction",
            json!([encoded, {
                "encoding": "base64",
                "skipPreflight": opts.skip_preflight,
                "maxRetries": opts.max_retries,
            }]),
        )
        .await
    }

    async fn get_signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, EngineError> {
        let response: RpcResponse<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, EngineError> {
        self.call("getBlockHeight", json!([{"commitment": commitment.as_str()}]))
            .await
    }

    async fn confirm_transaction(
        &self,
        signature: &str,
        blockhash: &BlockhashInfo,
        commitment: Commitment,
    ) -> Result<(), EngineError> {
        let deadline = tokio::time::Instant::now() + CONFIRM_CEILING;
        loop {
            if let Some(status) = self.get_signature_status(signature).await? {
                if let Some(err) = status.err {
                    return Err(EngineError::OnChain(format!("{signature}: {err}")));
                }
                if status.is_at_least(commitment) {
                    return Ok(());
                }
            } else {
                // Unseen yet; give up once the blockhash can no longer land.
                let height = self.get_block_height(commitment).await?;
                if height > blockhash.last_valid_block_height {
                    return Err(EngineError::StaleBlockhash(format!(
                        "{signature}: block height exceeded ({height} > {})",
                        blockhash.last_valid_block_height
                    )));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::StaleBlockhash(format!(
                    "{signature}: not confirmed within {}s",
                    CONFIRM_CEILING.as_secs()
                )));
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, EngineError> {
        self.call(
            "getSignaturesForAddress",
            json!([address, {"limit": limit, "commitment": "confirmed"}]),
        )
        .await
    }

    async fn transaction_transfers(
        &self,
        signature: &str,
    ) -> Result<Vec<SystemTransfer>, EngineError> {
        let result: Option<Value> = self
            .call(
                "getTransaction",
                json!([signature, {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;
        Ok(result.as_ref().map(parse_system_transfers).unwrap_or_default())
    }
}

/// Sum `uiAmount` over the parsed token accounts of a
/// `getTokenAccountsByOwner` response.
fn sum_token_accounts(value: &Value) -> f64 {
    value
        .as_array()
        .map(|accounts| {
            accounts
                .iter()
                .filter_map(|account| {
                    account
                        .pointer("/account/data/parsed/info/tokenAmount/uiAmount")
                        .and_then(Value::as_f64)
                })
                .sum()
        })
        .unwrap_or(0.0)
}

/// Walk a jsonParsed transaction and pull out every system-program
/// `transfer` instruction.
fn parse_system_transfers(tx: &Value) -> Vec<SystemTransfer> {
    let Some(instructions) = tx
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    instructions
        .iter()
        .filter(|ix| ix.get("program").and_then(Value::as_str) == Some("system"))
        .filter(|ix| ix.pointer("/parsed/type").and_then(Value::as_str) == Some("transfer"))
        .filter_map(|ix| {
            let info = ix.pointer("/parsed/info")?;
            Some(SystemTransfer {
                source: info.get("source")?.as_str()?.to_string(),
                destination: info.get("destination")?.as_str()?.to_string(),
                lamports: info.get("lamports")?.as_u64()?,
            })
        })
        .collect()
}
