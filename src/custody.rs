use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::EngineError;

/// Delegated signer over an opaque wallet handle. The custody service holds
/// the keys; this client only ever sees serialized transactions. It must
/// not touch the blockhash or fee payer — the caller sets both before
/// signing.
#[async_trait]
pub trait Custody: Send + Sync {
    /// Apply the wallet's signature and hand the transaction back for the
    /// caller to broadcast. Input and output are base64-serialized
    /// transactions (legacy or versioned).
    async fn sign(&self, wallet_address: &str, tx_base64: &str) -> Result<String, EngineError>;

    /// Sign and broadcast in one call; returns the signature for the
    /// caller to poll.
    async fn sign_and_send(
        &self,
        wallet_address: &str,
        tx_base64: &str,
    ) -> Result<String, EngineError>;
}

pub struct CustodyClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signed_transaction: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct CustodyErrorBody {
    error: Option<String>,
    code: Option<String>,
}

impl CustodyClient {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Config(format!("building custody client: {e}")))?;
        Ok(CustodyClient { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, EngineError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transient(format!("custody unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| EngineError::Custody(format!("malformed custody response: {e}")));
        }

        let detail = response
            .json::<CustodyErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error.or(b.code))
            .unwrap_or_else(|| status.to_string());

        Err(classify_custody_failure(status.as_u16(), &detail))
    }
}

/// 401/403 → not authorized, 404 → wallet unknown, 400 → bad transaction
/// (all fatal for this token); 5xx/429 → upstream trouble, retryable.
fn classify_custody_failure(status: u16, detail: &str) -> EngineError {
    match status {
        401 | 403 => EngineError::Custody(format!("not authorized: {detail}")),
        404 => EngineError::Custody(format!("wallet not found: {detail}")),
        400 | 422 => EngineError::Custody(format!("invalid transaction: {detail}")),
        429 => EngineError::RateLimited(format!("custody: {detail}")),
        _ => EngineError::Transient(format!("custody unavailable ({status}): {detail}")),
    }
}

#[async_trait]
impl Custody for CustodyClient {
    async fn sign(&self, wallet_address: &str, tx_base64: &str) -> Result<String, EngineError> {
        let response: SignResponse = self
            .post("/v1/sign", json!({ "wallet": wallet_address, "transaction": tx_base64 }))
            .await?;
        Ok(response.signed_transaction)
    }

    async fn sign_and_send(
        &self,
        wallet_address: &str,
        tx_base64: &str,
    ) -> Result<String, EngineError> {
        let response: SendResponse = self
            .post(
                "/v1/sign-and-send",
                json!({ "wallet": wallet_address, "transaction": tx_base64 }),
            )
            .await?;
        Ok(response.signature)
    }
}
