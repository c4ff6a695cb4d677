use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Dev,
    Ops,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Dev => "dev",
            WalletKind::Ops => "ops",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dev" => Some(WalletKind::Dev),
            "ops" => Some(WalletKind::Ops),
            _ => None,
        }
    }
}

/// A custody-managed wallet. The engine only ever holds the base58 address
/// and an opaque custody handle; signing material lives in the custody
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Base58 public key. Unique across all wallet records.
    pub address: String,
    pub kind: WalletKind,
    /// Opaque id the custody service resolves to signing material.
    pub custody_id: String,
    pub created_at: DateTime<Utc>,
}
