use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use solana_sdk::native_token::{lamports_to_sol, sol_to_lamports};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::amm::Amm;
use crate::chain::ChainRpc;
use crate::config::Settings;
use crate::executor::TxExecutor;
use crate::model::{ClaimRecord, Token, TokenSource, TransactionRecord, TxKind};
use crate::notify::Notifier;
use crate::store::Store;

/// Transfers below this are not worth the fee.
const MIN_TRANSFER_SOL: f64 = 0.001;

/// Lamport-exact split of a claimed amount. The reserve stays in the dev
/// wallet; the platform takes its percentage of the remainder and the user
/// gets the rest, so `claimed = reserve + platform_fee + user_share`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSplit {
    pub transferable: u64,
    pub platform_fee: u64,
    pub user_share: u64,
}

pub fn split_claim(
    claimed_lamports: u64,
    reserve_lamports: u64,
    platform_fee_pct: f64,
    skip_platform_fee: bool,
) -> ClaimSplit {
    let transferable = claimed_lamports.saturating_sub(reserve_lamports);
    let platform_fee = if skip_platform_fee {
        0
    } else {
        (transferable as f64 * platform_fee_pct / 100.0) as u64
    };
    let user_share = transferable - platform_fee;
    ClaimSplit { transferable, platform_fee, user_share }
}

/// Creator-fee claiming across tenants. Two cadences share one
/// implementation: the fast cycle claims anything above a high watermark,
/// the slow cycle works through a bounded batch at per-token thresholds.
pub struct ClaimScheduler {
    store: Store,
    chain: Arc<dyn ChainRpc>,
    amm: Arc<dyn Amm>,
    executor: Arc<TxExecutor>,
    notifier: Arc<dyn Notifier>,
    settings: Settings,
    fast_lock: Mutex<()>,
    slow_lock: Mutex<()>,
}

impl ClaimScheduler {
    pub fn new(
        store: Store,
        chain: Arc<dyn ChainRpc>,
        amm: Arc<dyn Amm>,
        executor: Arc<TxExecutor>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        ClaimScheduler {
            store,
            chain,
            amm,
            executor,
            notifier,
            settings,
            fast_lock: Mutex::new(()),
            slow_lock: Mutex::new(()),
        }
    }

    /// Fast cycle: catch large accruals quickly.
    pub async fn fast_tick(&self) {
        let Ok(_guard) = self.fast_lock.try_lock() else {
            debug!("fast claim tick still running; skipping");
            return;
        };
        let eligible = match self.store.autoclaim_eligible().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("loading auto-claim tokens: {e:#}");
                return;
            }
        };
        for (token, _config) in eligible {
            if let Err(e) = self
                .claim_if_above(&token, self.settings.claim_fast_threshold_sol)
                .await
            {
                warn!(token = %token.id, "fast claim: {e:#}");
            }
        }
    }

    /// Slow cycle: bounded batch at each token's own threshold.
    pub async fn slow_tick(&self) {
        let Ok(_guard) = self.slow_lock.try_lock() else {
            debug!("slow claim tick still running; skipping");
            return;
        };
        let eligible = match self.store.autoclaim_eligible().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("loading auto-claim tokens: {e:#}");
                return;
            }
        };
        for (token, config) in eligible
            .into_iter()
            .take(self.settings.max_claim_tokens_per_cycle)
        {
            if let Err(e) = self.claim_if_above(&token, config.fee_threshold_sol).await {
                warn!(token = %token.id, "slow claim: {e:#}");
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Read the claimable position; below the threshold there is nothing
    /// to do and no transaction is sent (idempotence comes free from the
    /// venue). Returns whether a claim ran.
    pub async fn claim_if_above(&self, token: &Token, threshold_sol: f64) -> Result<bool> {
        let positions = self
            .amm
            .claimable_positions(&token.dev_wallet)
            .await
            .context("reading claimable positions")?;
        let claimable = positions
            .iter()
            .find(|p| p.mint == token.mint)
            .map(|p| p.claimable_amount_sol)
            .unwrap_or(0.0);
        if claimable < threshold_sol {
            return Ok(false);
        }

        self.execute_claim(token, claimable).await?;
        Ok(true)
    }

    async fn execute_claim(&self, token: &Token, claimable_sol: f64) -> Result<()> {
        let started_at = Utc::now();
        let txs = self
            .amm
            .claim_txs(&token.dev_wallet, &[token.mint.clone()])
            .await
            .context("building claim transactions")?;
        if txs.is_empty() {
            return Ok(());
        }

        let mut last_signature = None;
        for tx in &txs {
            let outcome = self
                .executor
                .execute_delegated(&token.dev_wallet, tx)
                .await
                .context("sending claim transaction")?;
            last_signature = Some(outcome.signature);
        }

        // Split what actually landed, not the quoted claimable.
        let dev_sol = self.chain.get_sol_balance(&token.dev_wallet).await?;
        let split = split_claim(
            sol_to_lamports(dev_sol),
            sol_to_lamports(self.settings.dev_wallet_min_reserve_sol),
            self.settings.platform_fee_percent,
            token.source == TokenSource::Platform,
        );

        if split.platform_fee > 0
            && lamports_to_sol(split.platform_fee) >= MIN_TRANSFER_SOL
            && let Some(platform_wallet) = &self.settings.platform_ops_wallet
        {
            if let Err(e) = self
                .executor
                .transfer_sol_delegated(&token.dev_wallet, platform_wallet, split.platform_fee)
                .await
            {
                // Partial success is acceptable; the remainder still moves.
                warn!(token = %token.id, "platform fee transfer failed: {e}");
            }
        }
        if lamports_to_sol(split.user_share) >= MIN_TRANSFER_SOL
            && let Err(e) = self
                .executor
                .transfer_sol_delegated(&token.dev_wallet, &token.ops_wallet, split.user_share)
                .await
        {
            warn!(token = %token.id, "user share transfer failed: {e}");
        }

        let claim = ClaimRecord {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: token.id.clone(),
            total_sol: claimable_sol,
            platform_fee_sol: lamports_to_sol(split.platform_fee),
            user_share_sol: lamports_to_sol(split.user_share),
            signature: last_signature.clone(),
            started_at,
            completed_at: Some(Utc::now()),
        };
        self.store.insert_claim(&claim).await?;

        let mut record = TransactionRecord::new(&token.id, TxKind::Claim, claimable_sol);
        if let Some(signature) = &last_signature {
            record = record.confirmed(signature);
        }
        self.store.insert_transaction(&record).await?;

        self.notifier
            .notify(
                &token.owner_id,
                &format!(
                    "Claimed {claimable_sol:.4} SOL in creator fees for {} ({:.4} SOL to you)",
                    token.symbol,
                    lamports_to_sol(split.user_share),
                ),
            )
            .await;
        info!(
            token = %token.id,
            claimable_sol,
            platform_fee = lamports_to_sol(split.platform_fee),
            user_share = lamports_to_sol(split.user_share),
            "claim completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_lamport_exact() {
        // 0.5 SOL claimed, 0.01 reserve, 10% platform fee
        let split = split_claim(500_000_000, 10_000_000, 10.0, false);
        assert_eq!(split.transferable, 490_000_000);
        assert_eq!(split.platform_fee, 49_000_000);
        assert_eq!(split.user_share, 441_000_000);
        // claimed = reserve + fee + share
        assert_eq!(10_000_000 + split.platform_fee + split.user_share, 500_000_000);
    }

    #[test]
    fn split_survives_odd_lamports() {
        let claimed = 123_456_789;
        let reserve = 10_000_000;
        let split = split_claim(claimed, reserve, 10.0, false);
        assert_eq!(reserve + split.platform_fee + split.user_share, claimed);
    }

    #[test]
    fn platform_token_skips_fee() {
        let split = split_claim(500_000_000, 10_000_000, 10.0, true);
        assert_eq!(split.platform_fee, 0);
        assert_eq!(split.user_share, 490_000_000);
    }

    #[test]
    fn claim_below_reserve_transfers_nothing() {
        let split = split_claim(5_000_000, 10_000_000, 10.0, false);
        assert_eq!(split.transferable, 0);
        assert_eq!(split.platform_fee, 0);
        assert_eq!(split.user_share, 0);
    }
}
