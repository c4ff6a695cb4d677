use serde::Deserialize;

/// An enhanced transaction as delivered by the webhook provider. Field
/// names follow the provider's camelCase payloads; everything beyond what
/// the parser needs is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedTransaction {
    pub signature: String,
    #[serde(rename = "type", default)]
    pub tx_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub fee_payer: String,
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default)]
    pub account_data: Vec<AccountData>,
    #[serde(default)]
    pub events: Option<TxEvents>,
}

impl EnhancedTransaction {
    /// Only swap-shaped events are worth parsing.
    pub fn is_swap_like(&self) -> bool {
        matches!(self.tx_type.as_str(), "SWAP" | "BUY" | "SELL")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    #[serde(default)]
    pub from_user_account: String,
    #[serde(default)]
    pub to_user_account: String,
    /// Lamports.
    #[serde(default)]
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub from_user_account: String,
    #[serde(default)]
    pub to_user_account: String,
    #[serde(default)]
    pub mint: String,
    #[serde(default)]
    pub token_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(default)]
    pub account: String,
    /// Lamport delta; negative when the account paid out.
    #[serde(default)]
    pub native_balance_change: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxEvents {
    #[serde(default)]
    pub swap: Option<SwapEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    #[serde(default)]
    pub native_input: Option<NativeAmount>,
    #[serde(default)]
    pub native_output: Option<NativeAmount>,
    #[serde(default)]
    pub token_inputs: Vec<TokenAmount>,
    #[serde(default)]
    pub token_outputs: Vec<TokenAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeAmount {
    #[serde(default)]
    pub account: String,
    /// Lamports, as a decimal string in provider payloads.
    #[serde(default, deserialize_with = "lamports_from_any")]
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    #[serde(default)]
    pub mint: String,
    #[serde(default)]
    pub user_account: String,
}

fn lamports_from_any<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0))
}
