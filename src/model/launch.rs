use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStatus {
    /// Waiting for the deposit address to be funded.
    AwaitingDeposit,
    /// Claimed by a worker; launch call in flight.
    Launching,
    Completed,
    /// Launch failed after exhausting retries. Refund follows.
    Failed,
    /// Deadline passed before funding (or before launch succeeded).
    Expired,
    Refunded,
    /// Launch failed, retries remain; re-eligible after a short wait.
    RetryPending,
    Cancelled,
}

impl LaunchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStatus::AwaitingDeposit => "awaiting_deposit",
            LaunchStatus::Launching => "launching",
            LaunchStatus::Completed => "completed",
            LaunchStatus::Failed => "failed",
            LaunchStatus::Expired => "expired",
            LaunchStatus::Refunded => "refunded",
            LaunchStatus::RetryPending => "retry_pending",
            LaunchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_deposit" => Some(LaunchStatus::AwaitingDeposit),
            "launching" => Some(LaunchStatus::Launching),
            "completed" => Some(LaunchStatus::Completed),
            "failed" => Some(LaunchStatus::Failed),
            "expired" => Some(LaunchStatus::Expired),
            "refunded" => Some(LaunchStatus::Refunded),
            "retry_pending" => Some(LaunchStatus::RetryPending),
            "cancelled" => Some(LaunchStatus::Cancelled),
            _ => None,
        }
    }

    /// No further watcher action once a launch reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LaunchStatus::Completed
                | LaunchStatus::Refunded
                | LaunchStatus::Cancelled
                | LaunchStatus::Failed
        )
    }
}

/// A token launch waiting on a deposit. The deposit address is the token's
/// future dev wallet, pre-provisioned in custody.
///
/// At most one `awaiting_deposit` record may exist per deposit address;
/// the status column doubles as the optimistic lock the watcher CASes
/// through `awaiting_deposit → launching`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLaunch {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub description: Option<String>,
    /// Dev wallet address the user must fund.
    pub deposit_address: String,
    /// Ops wallet paired with the deposit wallet at provisioning time.
    pub ops_address: String,
    pub min_deposit_sol: f64,
    pub status: LaunchStatus,
    pub retry_count: u32,
    pub expires_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
