use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use solana_sdk::native_token::sol_to_lamports;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::ChainRpc;
use crate::config::Settings;
use crate::executor::TxExecutor;
use crate::launcher::TokenLauncher;
use crate::model::{
    AuditEvent, LaunchStatus, PendingLaunch, Token, TokenSource, TransactionRecord, TxKind,
    Wallet, WalletKind,
};
use crate::model::token_config::TokenConfig;
use crate::notify::Notifier;
use crate::store::Store;

/// Balances below this are treated as dust: an expired wallet holding less
/// is closed out without a refund transfer.
const REFUND_DUST_SOL: f64 = 0.001;
/// How many recent signatures to scan when looking for the funder.
const FUNDER_SCAN_DEPTH: usize = 20;

/// Watches pre-launch wallets for funding. Launches exactly once per
/// funded wallet (the status CAS is the serialization point), retries
/// bounded, and refunds on failure or expiry.
pub struct DepositWatcher {
    store: Store,
    chain: Arc<dyn ChainRpc>,
    executor: Arc<TxExecutor>,
    launcher: Arc<dyn TokenLauncher>,
    notifier: Arc<dyn Notifier>,
    settings: Settings,
    tick_lock: Mutex<()>,
}

impl DepositWatcher {
    pub fn new(
        store: Store,
        chain: Arc<dyn ChainRpc>,
        executor: Arc<TxExecutor>,
        launcher: Arc<dyn TokenLauncher>,
        notifier: Arc<dyn Notifier>,
        settings: Settings,
    ) -> Self {
        DepositWatcher {
            store,
            chain,
            executor,
            launcher,
            notifier,
            settings,
            tick_lock: Mutex::new(()),
        }
    }

    pub async fn tick(&self) {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("deposit tick still running; skipping");
            return;
        };

        let now = Utc::now();
        let launches = match self.store.watchable_launches(now).await {
            Ok(launches) => launches,
            Err(e) => {
                warn!("loading pending launches: {e:#}");
                return;
            }
        };

        for launch in launches {
            if let Err(e) = self.process_launch(&launch).await {
                warn!(launch = %launch.id, "deposit watcher: {e:#}");
            }
        }
    }

    async fn process_launch(&self, launch: &PendingLaunch) -> Result<()> {
        let now = Utc::now();
        if now >= launch.expires_at {
            return self.handle_expiry(launch).await;
        }

        let balance = self
            .chain
            .get_sol_balance(&launch.deposit_address)
            .await
            .context("reading deposit balance")?;
        let required = launch.min_deposit_sol.max(self.settings.min_deposit_sol);
        if balance < required {
            return Ok(());
        }

        // Claim the row; losing the race means another worker launches.
        let claimed = self
            .store
            .cas_launch_status(&launch.id, launch.status, LaunchStatus::Launching)
            .await?;
        if !claimed {
            debug!(launch = %launch.id, "launch already claimed elsewhere");
            return Ok(());
        }

        self.run_launch(launch).await
    }

    async fn run_launch(&self, launch: &PendingLaunch) -> Result<()> {
        match self.launcher.launch(launch).await {
            Ok(launched) => {
                // Wallet rows usually exist from provisioning; make sure.
                for (address, kind) in [
                    (&launch.deposit_address, WalletKind::Dev),
                    (&launch.ops_address, WalletKind::Ops),
                ] {
                    self.store
                        .ensure_wallet(&Wallet {
                            address: address.clone(),
                            kind,
                            custody_id: address.clone(),
                            created_at: Utc::now(),
                        })
                        .await?;
                }
                let token = Token {
                    id: uuid::Uuid::new_v4().to_string(),
                    mint: launched.mint.clone(),
                    name: launch.name.clone(),
                    symbol: launch.symbol.clone(),
                    decimals: 6,
                    image: launch.image.clone(),
                    source: TokenSource::Launched,
                    owner_id: launch.owner_id.clone(),
                    dev_wallet: launch.deposit_address.clone(),
                    ops_wallet: launch.ops_address.clone(),
                    is_active: true,
                    is_suspended: false,
                    suspend_reason: None,
                    is_verified: false,
                    daily_trade_limit_sol: None,
                    max_position_size_sol: None,
                    risk_level: None,
                    created_at: Utc::now(),
                };
                let config = TokenConfig::defaults_for(&token.id);
                self.store.insert_token(&token, &config).await?;
                self.store
                    .set_launch_status(&launch.id, LaunchStatus::Completed, None)
                    .await?;
                self.store
                    .insert_audit(&AuditEvent::new(
                        "launch_completed",
                        Some(&token.id),
                        &format!("mint {}", launched.mint),
                    ))
                    .await?;
                self.notifier
                    .notify(
                        &launch.owner_id,
                        &format!("{} ({}) is live — flywheel running", launch.name, launch.symbol),
                    )
                    .await;
                info!(launch = %launch.id, mint = %launched.mint, "launch completed");
                Ok(())
            }
            Err(e) => {
                let retries = self.store.increment_launch_retry(&launch.id).await?;
                if retries < self.settings.max_launch_retries {
                    self.store
                        .set_launch_status(
                            &launch.id,
                            LaunchStatus::RetryPending,
                            Some(&e.to_string()),
                        )
                        .await?;
                    warn!(launch = %launch.id, retries, "launch failed; will retry: {e}");
                } else {
                    self.store
                        .set_launch_status(&launch.id, LaunchStatus::Failed, Some(&e.to_string()))
                        .await?;
                    self.store
                        .insert_audit(&AuditEvent::new(
                            "launch_failed",
                            None,
                            &format!("launch {}: {e}", launch.id),
                        ))
                        .await?;
                    warn!(launch = %launch.id, "launch failed after max retries: {e}");
                    self.notifier
                        .notify(
                            &launch.owner_id,
                            &format!(
                                "Launch of {} failed — auto-refund in progress",
                                launch.symbol
                            ),
                        )
                        .await;
                    if let Some(current) = self.store.get_launch(&launch.id).await? {
                        if let Err(refund_err) = self.refund(&current).await {
                            warn!(launch = %launch.id, "refund failed: {refund_err:#}");
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_expiry(&self, launch: &PendingLaunch) -> Result<()> {
        let balance = self
            .chain
            .get_sol_balance(&launch.deposit_address)
            .await
            .context("reading expired deposit balance")?;

        self.store
            .set_launch_status(&launch.id, LaunchStatus::Expired, None)
            .await?;

        if balance <= REFUND_DUST_SOL {
            self.notifier
                .notify(
                    &launch.owner_id,
                    &format!("Launch of {} expired with no deposit received", launch.symbol),
                )
                .await;
            info!(launch = %launch.id, "expired with no deposit");
            return Ok(());
        }

        let mut expired = launch.clone();
        expired.status = LaunchStatus::Expired;
        match self.refund(&expired).await {
            Ok(signature) => {
                self.notifier
                    .notify(
                        &launch.owner_id,
                        &format!(
                            "Launch of {} expired — deposit refunded ({signature})",
                            launch.symbol
                        ),
                    )
                    .await;
            }
            Err(e) => {
                self.notifier
                    .notify(
                        &launch.owner_id,
                        &format!(
                            "Launch of {} expired; automatic refund failed and will be \
                             handled manually",
                            launch.symbol
                        ),
                    )
                    .await;
                warn!(launch = %launch.id, "expiry refund failed: {e:#}");
            }
        }
        Ok(())
    }

    /// Refund the deposit, minus the rent reserve, to the original funder.
    /// Not allowed on an already-refunded launch; makes no on-chain call
    /// in that case.
    pub async fn refund(&self, launch: &PendingLaunch) -> Result<String> {
        if launch.status == LaunchStatus::Refunded {
            bail!("launch {} already refunded", launch.id);
        }

        let balance = self.chain.get_sol_balance(&launch.deposit_address).await?;
        let refundable = balance - self.settings.rent_reserve_sol;
        if refundable <= 0.0 {
            bail!("nothing to refund from {}", launch.deposit_address);
        }

        let Some(funder) = self.find_original_funder(&launch.deposit_address).await? else {
            self.store
                .set_launch_status(&launch.id, launch.status, Some("funder not found"))
                .await?;
            bail!(
                "original funder of {} not found in the last {FUNDER_SCAN_DEPTH} signatures; \
                 manual refund required",
                launch.deposit_address
            );
        };

        match self
            .executor
            .transfer_sol_delegated(&launch.deposit_address, &funder, sol_to_lamports(refundable))
            .await
        {
            Ok(outcome) => {
                self.store
                    .set_launch_status(&launch.id, LaunchStatus::Refunded, None)
                    .await?;
                self.store
                    .insert_audit(&AuditEvent::new(
                        "refund",
                        None,
                        &format!(
                            "launch {}: {refundable} SOL to {funder} ({})",
                            launch.id, outcome.signature
                        ),
                    ))
                    .await?;
                let mut record =
                    TransactionRecord::new(&launch.id, TxKind::Transfer, refundable)
                        .confirmed(&outcome.signature);
                record.detail = Some("refund".into());
                self.store.insert_transaction(&record).await?;
                info!(launch = %launch.id, %funder, refundable, "refund sent");
                Ok(outcome.signature)
            }
            Err(e) => {
                self.store
                    .set_launch_status(&launch.id, launch.status, Some(&e.to_string()))
                    .await?;
                Err(e).context("refund transfer")
            }
        }
    }

    /// Scan the wallet's recent history, newest first, for the first
    /// inbound system transfer; its source is the funder.
    async fn find_original_funder(&self, deposit_address: &str) -> Result<Option<String>> {
        let signatures = self
            .chain
            .signatures_for_address(deposit_address, FUNDER_SCAN_DEPTH)
            .await?;
        for info in &signatures {
            if info.err.is_some() {
                continue;
            }
            let transfers = self.chain.transaction_transfers(&info.signature).await?;
            if let Some(transfer) = transfers
                .iter()
                .find(|t| t.destination == deposit_address && t.lamports > 0)
            {
                return Ok(Some(transfer.source.clone()));
            }
        }
        Ok(None)
    }
}
