use serde::{Deserialize, Serialize};

/// Trade side. Implicit in the mint ordering on the wire (SOL → token is a
/// buy); carried explicitly in-process for clarity, never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A quote from the AMM. `raw` is the opaque blob the venue requires back
/// on `swap_tx`; nothing in this crate inspects it.
#[derive(Debug, Clone, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub raw: serde_json::Value,
    #[serde(rename = "inAmount", deserialize_with = "de_amount")]
    pub in_amount: u64,
    #[serde(rename = "outAmount", deserialize_with = "de_amount")]
    pub out_amount: u64,
    #[serde(rename = "priceImpactPct", default)]
    pub price_impact_pct: f64,
    #[serde(rename = "feeAmount", default, deserialize_with = "de_amount_opt")]
    pub fee_amount: u64,
}

/// Atomic amounts arrive as either JSON numbers or decimal strings.
fn de_amount<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| D::Error::custom(format!("not an amount: {value}")))
}

fn de_amount_opt<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    de_amount(deserializer).or(Ok(0))
}

/// A swap transaction ready for signing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTx {
    pub swap_transaction: String,
    #[serde(default)]
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image: Option<String>,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeFees {
    #[serde(default)]
    pub total_sol: f64,
    #[serde(default)]
    pub creator_sol: f64,
    #[serde(default)]
    pub total_usd: f64,
    #[serde(default)]
    pub creator_usd: f64,
}

/// One claimable creator-fee position for a wallet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimablePosition {
    pub mint: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub claimable_amount_sol: f64,
    #[serde(default)]
    pub last_claim_time: Option<i64>,
}

/// Best-effort market stats; never on the primary path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    #[serde(default)]
    pub market_cap_usd: Option<f64>,
    #[serde(default)]
    pub holder_count: Option<u64>,
    #[serde(default)]
    pub volume_24h_sol: Option<f64>,
}
