use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Buy,
    Sell,
    Transfer,
    Claim,
    Info,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Buy => "buy",
            TxKind::Sell => "sell",
            TxKind::Transfer => "transfer",
            TxKind::Claim => "claim",
            TxKind::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TxKind::Buy),
            "sell" => Some(TxKind::Sell),
            "transfer" => Some(TxKind::Transfer),
            "claim" => Some(TxKind::Claim),
            "info" => Some(TxKind::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TxStatus::Pending),
            "confirmed" => Some(TxStatus::Confirmed),
            "failed" => Some(TxStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only trade/transfer history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub token_id: String,
    pub kind: TxKind,
    /// SOL for buys/transfers/claims, token units for sells.
    pub amount: f64,
    pub signature: Option<String>,
    pub status: TxStatus,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(token_id: &str, kind: TxKind, amount: f64) -> Self {
        TransactionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: token_id.to_string(),
            kind,
            amount,
            signature: None,
            status: TxStatus::Pending,
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn confirmed(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self.status = TxStatus::Confirmed;
        self
    }

    pub fn failed(mut self, detail: &str) -> Self {
        self.status = TxStatus::Failed;
        self.detail = Some(detail.to_string());
        self
    }
}

/// One completed fee claim with its split.
/// `total = platform_fee + user_share + retained reserve` in lamport terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: String,
    pub token_id: String,
    pub total_sol: f64,
    pub platform_fee_sol: f64,
    pub user_share_sol: f64,
    pub signature: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Best-effort cache of a token's wallet balances; refreshed during the
/// flywheel sweep so dashboards never block on RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub token_id: String,
    pub dev_sol: f64,
    pub ops_sol: f64,
    pub dev_tokens: f64,
    pub ops_tokens: f64,
    pub claimable_sol: f64,
    pub sol_price_usd: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only operational audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub kind: String,
    pub token_id: Option<String>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: &str, token_id: Option<&str>, detail: &str) -> Self {
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            token_id: token_id.map(|s| s.to_string()),
            detail: detail.to_string(),
            created_at: Utc::now(),
        }
    }
}
