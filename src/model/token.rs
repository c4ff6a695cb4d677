use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a token entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Created through the deposit-funded launch flow.
    Launched,
    /// Pre-existing token registered by its owner.
    Registered,
    /// Market-making only; no fee claim rights.
    MmOnly,
    /// The platform's own token. Exempt from bulk suspension and the
    /// platform-fee split.
    Platform,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Launched => "launched",
            TokenSource::Registered => "registered",
            TokenSource::MmOnly => "mm_only",
            TokenSource::Platform => "platform",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "launched" => Some(TokenSource::Launched),
            "registered" => Some(TokenSource::Registered),
            "mm_only" => Some(TokenSource::MmOnly),
            "platform" => Some(TokenSource::Platform),
            _ => None,
        }
    }
}

/// A registered token and its two wallets.
///
/// `dev_wallet` collects creator fees and funds launches; `ops_wallet`
/// trades and receives the user's fee share. The two are always distinct
/// addresses (enforced at the store boundary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub image: Option<String>,
    pub source: TokenSource,
    pub owner_id: String,
    pub dev_wallet: String,
    pub ops_wallet: String,
    pub is_active: bool,
    pub is_suspended: bool,
    pub suspend_reason: Option<String>,
    pub is_verified: bool,
    /// Per-token trading limits, set via admin control.
    pub daily_trade_limit_sol: Option<f64>,
    pub max_position_size_sol: Option<f64>,
    pub risk_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// Structural invariants: distinct wallets, sane decimals.
    pub fn validate(&self) -> Result<(), String> {
        if self.dev_wallet == self.ops_wallet {
            return Err("dev and ops wallets must be distinct".into());
        }
        if self.decimals > 18 {
            return Err(format!("decimals {} out of range 0..=18", self.decimals));
        }
        if self.mint.is_empty() {
            return Err("mint address is empty".into());
        }
        Ok(())
    }
}
