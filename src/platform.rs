use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use solana_sdk::native_token::sol_to_lamports;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::amm::{Amm, Side, mint_pair_for};
use crate::chain::ChainRpc;
use crate::config::Settings;
use crate::executor::TxExecutor;
use crate::model::token_config::TokenConfig;
use crate::model::{FlywheelState, TransactionRecord, TxKind};
use crate::scheduler::algorithms::{self, Balances, TradeDecision};
use crate::store::Store;

const PLATFORM_TOKEN_ID: &str = "platform";
const PLATFORM_DECIMALS: u8 = 6;

/// The platform's own flywheel: the simple rotation plus a claim cycle
/// with no fee split, running on env-provided keypairs. The only path in
/// the engine that signs locally.
pub struct PlatformLoop {
    store: Store,
    chain: Arc<dyn ChainRpc>,
    amm: Arc<dyn Amm>,
    executor: Arc<TxExecutor>,
    settings: Settings,
    mint: String,
    dev_keypair: Keypair,
    ops_keypair: Keypair,
    config: TokenConfig,
    tick_lock: Mutex<()>,
}

impl PlatformLoop {
    /// Build from settings; None when the platform token is not
    /// configured for this deployment.
    pub fn from_settings(
        store: Store,
        chain: Arc<dyn ChainRpc>,
        amm: Arc<dyn Amm>,
        executor: Arc<TxExecutor>,
        settings: Settings,
    ) -> Result<Option<Self>> {
        let (Some(mint), Some(dev_raw), Some(ops_raw)) = (
            settings.platform_token_mint.clone(),
            settings.platform_dev_keypair.clone(),
            settings.platform_ops_keypair.clone(),
        ) else {
            return Ok(None);
        };

        let dev_keypair = parse_keypair(&dev_raw).context("PLATFORM_DEV_KEYPAIR")?;
        let ops_keypair = parse_keypair(&ops_raw).context("PLATFORM_OPS_KEYPAIR")?;
        let config = TokenConfig::defaults_for(PLATFORM_TOKEN_ID);

        Ok(Some(PlatformLoop {
            store,
            chain,
            amm,
            executor,
            settings,
            mint,
            dev_keypair,
            ops_keypair,
            config,
            tick_lock: Mutex::new(()),
        }))
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    pub async fn tick(&self) {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            return;
        };
        if let Err(e) = self.claim_cycle().await {
            warn!("platform claim: {e:#}");
        }
        if let Err(e) = self.trade_cycle().await {
            warn!("platform trade: {e:#}");
        }
    }

    async fn trade_cycle(&self) -> Result<()> {
        let mut state = self
            .store
            .get_platform_state()
            .await?
            .unwrap_or_else(|| FlywheelState::initial(PLATFORM_TOKEN_ID));
        let ops = self.ops_keypair.pubkey().to_string();

        let balances = Balances {
            ops_sol: self.chain.get_sol_balance(&ops).await?,
            ops_tokens: self.chain.get_token_balance(&ops, &self.mint).await?,
        };

        let decision = {
            let mut rng = rand::rng();
            algorithms::decide_simple(&state, &self.config, balances, PLATFORM_DECIMALS, &mut rng)
        };

        let now = Utc::now();
        match decision {
            TradeDecision::Buy { sol_amount, .. } => {
                let signature = self.swap_local(Side::Buy, sol_amount).await?;
                let snapshot = if state.buy_count + 1 >= self.settings.buys_per_cycle {
                    self.chain.get_token_balance(&ops, &self.mint).await.unwrap_or(0.0)
                } else {
                    0.0
                };
                state.apply_buy(self.settings.buys_per_cycle, snapshot, now);
                state.last_check_result = Some("buy".into());
                self.record(TxKind::Buy, sol_amount, &signature).await;
                info!(sol_amount, %signature, "platform buy confirmed");
            }
            TradeDecision::Sell { token_amount, .. } => {
                let amount = token_amount.min(balances.ops_tokens);
                let signature = self.swap_local(Side::Sell, amount).await?;
                state.apply_sell(self.settings.sells_per_cycle, now);
                state.last_check_result = Some("sell".into());
                self.record(TxKind::Sell, amount, &signature).await;
                info!(token_amount = amount, %signature, "platform sell confirmed");
            }
            TradeDecision::ResetCycle { reason } => {
                state.reset_to_buy();
                state.last_check_result = Some(reason.to_string());
            }
            TradeDecision::Skip { reason } | TradeDecision::Pause { reason, .. } => {
                state.last_check_result = Some(reason.to_string());
                debug!(reason, "platform flywheel idle");
            }
        }
        state.last_checked_at = Some(now);
        self.store.save_platform_state(&state).await?;
        Ok(())
    }

    async fn swap_local(&self, side: Side, amount: f64) -> Result<String> {
        let (input_mint, output_mint) = mint_pair_for(side, &self.mint);
        let amount_atomic = match side {
            Side::Buy => sol_to_lamports(amount),
            Side::Sell => (amount * 10f64.powi(PLATFORM_DECIMALS as i32)) as u64,
        };
        let quote = self
            .amm
            .quote(&input_mint, &output_mint, amount_atomic, self.config.slippage_bps)
            .await?;
        let ops = self.ops_keypair.pubkey().to_string();
        let swap = self.amm.swap_tx(&ops, &quote).await?;
        let outcome = self
            .executor
            .execute_local(&self.ops_keypair, &swap.swap_transaction)
            .await?;
        Ok(outcome.signature)
    }

    /// Claim accrued fees into the dev wallet, then sweep everything above
    /// the reserve to the ops wallet. No platform-fee split here.
    async fn claim_cycle(&self) -> Result<()> {
        let dev = self.dev_keypair.pubkey().to_string();
        let positions = self.amm.claimable_positions(&dev).await?;
        let claimable = positions
            .iter()
            .find(|p| p.mint == self.mint)
            .map(|p| p.claimable_amount_sol)
            .unwrap_or(0.0);
        if claimable < self.settings.claim_fast_threshold_sol {
            return Ok(());
        }

        let txs = self.amm.claim_txs(&dev, &[self.mint.clone()]).await?;
        let mut last_signature = None;
        for tx in &txs {
            let outcome = self.executor.execute_local(&self.dev_keypair, tx).await?;
            last_signature = Some(outcome.signature);
        }

        let dev_sol = self.chain.get_sol_balance(&dev).await?;
        let sweep = dev_sol - self.settings.dev_wallet_min_reserve_sol;
        if sweep > 0.001 {
            let ops = self.ops_keypair.pubkey().to_string();
            let outcome = self
                .executor
                .transfer_sol_local(&self.dev_keypair, &ops, sol_to_lamports(sweep))
                .await?;
            self.record(TxKind::Transfer, sweep, &outcome.signature).await;
        }

        if let Some(signature) = &last_signature {
            self.record(TxKind::Claim, claimable, signature).await;
            info!(claimable, swept = sweep.max(0.0), "platform claim completed");
        }
        Ok(())
    }

    async fn record(&self, kind: TxKind, amount: f64, signature: &str) {
        let record =
            TransactionRecord::new(PLATFORM_TOKEN_ID, kind, amount).confirmed(signature);
        if let Err(e) = self.store.insert_transaction(&record).await {
            warn!("recording platform transaction: {e:#}");
        }
    }
}

/// Accepts the JSON byte-array keypair file format or a base58 secret.
fn parse_keypair(raw: &str) -> Result<Keypair> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let bytes: Vec<u8> =
            serde_json::from_str(trimmed).context("keypair byte array")?;
        return Keypair::try_from(bytes.as_slice())
            .map_err(|e| anyhow::anyhow!("keypair bytes: {e}"));
    }
    std::panic::catch_unwind(|| Keypair::from_base58_string(trimmed))
        .map_err(|_| anyhow::anyhow!("keypair is not valid base58"))
}
