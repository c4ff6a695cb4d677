pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::model::AuditEvent;
use crate::scheduler::{SchedulerKind, Schedulers};
use crate::store::Store;

pub use auth::{MUTATION_WINDOW_SECS, SESSION_WINDOW_SECS, NonceIssue, SignedRequest};

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsUpdate {
    pub daily_trade_limit_sol: Option<f64>,
    pub max_position_size_sol: Option<f64>,
    pub risk_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartRequest {
    pub scheduler: String,
    pub interval_secs: Option<u64>,
    pub trade_budget: Option<u32>,
}

/// Operator controls. No trading logic of its own — each operation is a
/// store update (plus an audit row) or a scheduler lifecycle call.
pub struct AdminService {
    store: Store,
    schedulers: Arc<Schedulers>,
    pub admin_pubkeys: Vec<String>,
}

impl AdminService {
    pub fn new(store: Store, schedulers: Arc<Schedulers>, admin_pubkeys: Vec<String>) -> Self {
        AdminService { store, schedulers, admin_pubkeys }
    }

    /// Suspend a token and force its automation off. Idempotent: a second
    /// suspension succeeds and refreshes the reason.
    pub async fn suspend(&self, token_id: &str, reason: &str) -> Result<()> {
        let Some(token) = self.store.get_token(token_id).await? else {
            bail!("token {token_id} not found");
        };
        self.store.suspend_token(&token.id, reason).await?;
        self.store
            .insert_audit(&AuditEvent::new("suspend", Some(token_id), reason))
            .await?;
        info!(token = token_id, reason, "token suspended");
        Ok(())
    }

    /// Clears the suspension flag only. Automation flags were erased by
    /// the suspension and stay off until the owner re-enables them.
    pub async fn unsuspend(&self, token_id: &str) -> Result<()> {
        let Some(token) = self.store.get_token(token_id).await? else {
            bail!("token {token_id} not found");
        };
        self.store.unsuspend_token(&token.id).await?;
        self.store
            .insert_audit(&AuditEvent::new("unsuspend", Some(token_id), ""))
            .await?;
        info!(token = token_id, "token unsuspended");
        Ok(())
    }

    /// Suspend everything except the platform token. Returns how many
    /// tokens were touched.
    pub async fn bulk_suspend(&self, reason: &str) -> Result<usize> {
        let touched = self.store.bulk_suspend(reason).await?;
        self.store
            .insert_audit(&AuditEvent::new(
                "bulk_suspend",
                None,
                &format!("{touched} tokens: {reason}"),
            ))
            .await?;
        info!(touched, reason, "bulk suspension applied");
        Ok(touched)
    }

    pub async fn update_limits(&self, token_id: &str, limits: &LimitsUpdate) -> Result<()> {
        self.store
            .update_limits(
                token_id,
                limits.daily_trade_limit_sol,
                limits.max_position_size_sol,
                limits.risk_level.as_deref(),
            )
            .await?;
        self.store
            .insert_audit(&AuditEvent::new(
                "limits_update",
                Some(token_id),
                &serde_json::to_string(&serde_json::json!({
                    "daily_trade_limit_sol": limits.daily_trade_limit_sol,
                    "max_position_size_sol": limits.max_position_size_sol,
                    "risk_level": limits.risk_level,
                }))?,
            ))
            .await?;
        Ok(())
    }

    /// Stop-then-start a scheduler, optionally changing its interval and
    /// (for the flywheel) the per-tick trade budget.
    pub async fn restart_scheduler(&self, request: &RestartRequest) -> Result<()> {
        let Some(kind) = SchedulerKind::parse(&request.scheduler) else {
            bail!("unknown scheduler {:?}", request.scheduler);
        };
        self.schedulers
            .restart(
                kind,
                request.interval_secs.map(Duration::from_secs),
                request.trade_budget,
            )
            .await;
        self.store
            .insert_audit(&AuditEvent::new(
                "scheduler_restart",
                None,
                &format!(
                    "{} interval={:?} budget={:?}",
                    kind.as_str(),
                    request.interval_secs,
                    request.trade_budget
                ),
            ))
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<serde_json::Value> {
        self.store.platform_stats().await
    }
}
