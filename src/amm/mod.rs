pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::SOL_MINT;
use crate::error::EngineError;

pub use types::{ClaimablePosition, LifetimeFees, MarketStats, Quote, Side, SwapTx, TokenMetadata};

/// The bonding-curve / AMM service: quotes, swap and claim transaction
/// generation, token metadata. Graduated tokens route through the same
/// interface — the aggregator behind it is the venue's concern.
#[async_trait]
pub trait Amm: Send + Sync {
    async fn token_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError>;

    async fn lifetime_fees(&self, mint: &str) -> Result<LifetimeFees, EngineError>;

    async fn claimable_positions(
        &self,
        wallet: &str,
    ) -> Result<Vec<ClaimablePosition>, EngineError>;

    /// Quote `amount_atomic` of `input_mint` into `output_mint`.
    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_atomic: u64,
        slippage_bps: u16,
    ) -> Result<Quote, EngineError>;

    /// Build the swap transaction for a previously obtained quote. The
    /// quote's `raw` blob is passed back verbatim.
    async fn swap_tx(&self, wallet_address: &str, quote: &Quote) -> Result<SwapTx, EngineError>;

    /// Claim transactions for the given mints; the venue may batch, so
    /// one request can yield several transactions.
    async fn claim_txs(
        &self,
        wallet_address: &str,
        mints: &[String],
    ) -> Result<Vec<String>, EngineError>;

    /// Best-effort stats. Implementations swallow upstream failures and
    /// return defaults — this must never block a primary operation.
    async fn market_stats(&self, mint: &str) -> MarketStats;
}

pub struct AmmClient {
    http: reqwest::Client,
    base_url: String,
}

impl AmmClient {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Config(format!("building amm client: {e}")))?;
        Ok(AmmClient { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, EngineError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EngineError::RateLimited(format!("amm: {url}")));
        }
        if !status.is_success() {
            return Err(EngineError::Transient(format!("amm {url}: HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("amm {url}: decoding: {e}")))
    }
}

#[async_trait]
impl Amm for AmmClient {
    async fn token_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError> {
        let value = self.get_json(&self.url(&format!("/v1/tokens/{mint}"))).await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Other(format!("token metadata shape: {e}")))
    }

    async fn lifetime_fees(&self, mint: &str) -> Result<LifetimeFees, EngineError> {
        let value = self.get_json(&self.url(&format!("/v1/tokens/{mint}/fees"))).await?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Other(format!("lifetime fees shape: {e}")))
    }

    async fn claimable_positions(
        &self,
        wallet: &str,
    ) -> Result<Vec<ClaimablePosition>, EngineError> {
        let value = self
            .get_json(&self.url(&format!("/v1/wallets/{wallet}/claimable")))
            .await?;
        let positions = value
            .get("positions")
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        serde_json::from_value(positions)
            .map_err(|e| EngineError::Other(format!("claimable positions shape: {e}")))
    }

    async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_atomic: u64,
        slippage_bps: u16,
    ) -> Result<Quote, EngineError> {
        let url = self.url(&format!(
            "/v1/quote?inputMint={input_mint}&outputMint={output_mint}\
             &amount={amount_atomic}&slippageBps={slippage_bps}"
        ));
        let value = self.get_json(&url).await?;

        if value.get("error").is_some()
            || value.get("outAmount").is_none()
            || value.pointer("/outAmount").and_then(as_amount) == Some(0)
        {
            return Err(EngineError::QuoteUnavailable(format!(
                "{input_mint} -> {output_mint} for {amount_atomic}"
            )));
        }

        // Keep the full response as the opaque blob swap_tx needs back.
        let mut quote: Quote = serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Other(format!("quote shape: {e}")))?;
        quote.raw = value;
        Ok(quote)
    }

    async fn swap_tx(&self, wallet_address: &str, quote: &Quote) -> Result<SwapTx, EngineError> {
        let response = self
            .http
            .post(self.url("/v1/swap"))
            .json(&json!({
                "userPublicKey": wallet_address,
                "quoteResponse": quote.raw,
                "wrapAndUnwrapSol": true,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transient(format!("amm swap: HTTP {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Other(format!("swap tx shape: {e}")))
    }

    async fn claim_txs(
        &self,
        wallet_address: &str,
        mints: &[String],
    ) -> Result<Vec<String>, EngineError> {
        let response = self
            .http
            .post(self.url("/v1/claim"))
            .json(&json!({ "wallet": wallet_address, "mints": mints }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transient(format!("amm claim: HTTP {status}")));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Other(format!("claim txs shape: {e}")))?;
        let txs = value
            .get("transactions")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(txs)
    }

    async fn market_stats(&self, mint: &str) -> MarketStats {
        match self.get_json(&self.url(&format!("/v1/tokens/{mint}/stats"))).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(e) => {
                debug!(mint, "market stats unavailable: {e}");
                MarketStats::default()
            }
        }
    }
}

/// Amount fields arrive as either a JSON number or a decimal string.
fn as_amount(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Order the mints for a swap in `side` direction against SOL.
pub fn mint_pair_for(side: Side, token_mint: &str) -> (String, String) {
    match side {
        Side::Buy => (SOL_MINT.to_string(), token_mint.to_string()),
        Side::Sell => (token_mint.to_string(), SOL_MINT.to_string()),
    }
}
