use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use solana_sdk::native_token::{lamports_to_sol, sol_to_lamports};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::amm::{Amm, Side, mint_pair_for};
use crate::chain::ChainRpc;
use crate::config::Settings;
use crate::error::EngineError;
use crate::executor::{ExecOutcome, TxExecutor};
use crate::model::token_config::TokenConfig;
use crate::model::{
    Algorithm, BalanceSnapshot, FlywheelState, Token, TokenSource, TransactionRecord, TxKind,
};
use crate::signal::SignalEngine;
use crate::store::Store;

use super::algorithms::{
    self, Balances, DynamicOutcome, TURBO_CYCLE, TradeDecision,
};

/// Pause applied after this many consecutive trade failures.
const FAILURE_PAUSE_THRESHOLD: u32 = 5;
const FAILURE_PAUSE_SECS: i64 = 600;
/// Transfers below this are not worth the fee.
const MIN_TRANSFER_SOL: f64 = 0.001;
const INTER_TOKEN_DELAY: Duration = Duration::from_millis(500);

/// The per-token trading loop. One tick sweeps every eligible token in
/// sequence; each token gets at most one trade per tick, and the tick as a
/// whole stops at the trade budget.
pub struct FlywheelScheduler {
    store: Store,
    chain: Arc<dyn ChainRpc>,
    amm: Arc<dyn Amm>,
    executor: Arc<TxExecutor>,
    signals: Arc<SignalEngine>,
    settings: Settings,
    trade_budget: AtomicU32,
    tick_lock: Mutex<()>,
    inter_token_delay: Duration,
    /// Trailing 24 h volume per mint, for VWAP slice weighting.
    volume_ema: Mutex<HashMap<String, f64>>,
}

impl FlywheelScheduler {
    pub fn new(
        store: Store,
        chain: Arc<dyn ChainRpc>,
        amm: Arc<dyn Amm>,
        executor: Arc<TxExecutor>,
        signals: Arc<SignalEngine>,
        settings: Settings,
    ) -> Self {
        let trade_budget = AtomicU32::new(settings.max_trades_per_minute);
        FlywheelScheduler {
            store,
            chain,
            amm,
            executor,
            signals,
            settings,
            trade_budget,
            tick_lock: Mutex::new(()),
            inter_token_delay: INTER_TOKEN_DELAY,
            volume_ema: Mutex::new(HashMap::new()),
        }
    }

    /// Tests drop the RPC-pressure delay.
    pub fn with_inter_token_delay(mut self, delay: Duration) -> Self {
        self.inter_token_delay = delay;
        self
    }

    pub fn set_trade_budget(&self, budget: u32) {
        self.trade_budget.store(budget, Ordering::Relaxed);
    }

    /// One scheduler tick. Re-entrancy is a no-op: an overlapping tick
    /// returns immediately.
    pub async fn tick(&self) {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("flywheel tick still running; skipping");
            return;
        };

        let eligible = match self.store.flywheel_eligible().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("loading eligible tokens: {e:#}");
                return;
            }
        };
        if eligible.is_empty() {
            return;
        }

        let budget = self.trade_budget.load(Ordering::Relaxed);
        let mut traded = 0u32;
        for (token, config) in &eligible {
            if traded >= budget {
                info!(budget, "trade budget reached; ending tick early");
                break;
            }
            match self.process_token(token, config).await {
                Ok(true) => traded += 1,
                Ok(false) => {}
                Err(e) => warn!(token = %token.id, "flywheel error: {e:#}"),
            }
            tokio::time::sleep(self.inter_token_delay).await;
        }
        debug!(tokens = eligible.len(), traded, "flywheel tick complete");
    }

    /// Full per-token pass: fee preflight, state hydrate, dispatch, apply.
    /// Returns whether a trade was executed.
    pub async fn process_token(&self, token: &Token, config: &TokenConfig) -> Result<bool> {
        // Fee collection happens regardless of the trade outcome and never
        // blocks it.
        let dev_sol = self.collect_dev_fees(token).await;

        let mut state = self
            .store
            .get_or_init_state(&token.id)
            .await
            .context("hydrating flywheel state")?;
        let now = Utc::now();

        if state.is_paused(now) {
            return self.record_check(&mut state, "paused").await.map(|_| false);
        }

        // Per-token interval floor. Turbo ignores it; reactive tokens trade
        // from the webhook path only.
        if config.algorithm == Algorithm::TransactionReactive {
            return self.record_check(&mut state, "reactive_mode").await.map(|_| false);
        }
        if config.algorithm != Algorithm::TurboLite
            && config.buy_interval_secs > 0
            && let Some(last) = state.last_trade_at
            && (now - last).num_seconds() < config.buy_interval_secs as i64
        {
            return self.record_check(&mut state, "interval_wait").await.map(|_| false);
        }

        if !config.market_making_enabled {
            return self.record_check(&mut state, "market_making_disabled").await.map(|_| false);
        }

        let balances = Balances {
            ops_sol: self.chain.get_sol_balance(&token.ops_wallet).await?,
            ops_tokens: self.chain.get_token_balance(&token.ops_wallet, &token.mint).await?,
        };

        // Best-effort snapshot for dashboards.
        let snapshot = BalanceSnapshot {
            token_id: token.id.clone(),
            dev_sol: dev_sol.unwrap_or(0.0),
            ops_sol: balances.ops_sol,
            dev_tokens: 0.0,
            ops_tokens: balances.ops_tokens,
            claimable_sol: 0.0,
            sol_price_usd: None,
            updated_at: now,
        };
        if let Err(e) = self.store.save_balance_snapshot(&snapshot).await {
            debug!(token = %token.id, "balance snapshot: {e:#}");
        }

        let (decision, dynamic) = self.dispatch(token, config, &state, balances).await;

        self.apply_decision(token, config, &mut state, balances, decision, dynamic)
            .await
    }

    /// Pick a trade (or a recorded no-op) for this token.
    async fn dispatch(
        &self,
        token: &Token,
        config: &TokenConfig,
        state: &FlywheelState,
        balances: Balances,
    ) -> (TradeDecision, Option<DynamicOutcome>) {
        let decimals = token.decimals;
        match config.algorithm {
            Algorithm::Simple | Algorithm::TransactionReactive => {
                let mut rng = rand::rng();
                (algorithms::decide_simple(state, config, balances, decimals, &mut rng), None)
            }
            Algorithm::TurboLite => {
                let mut rng = rand::rng();
                (algorithms::decide_turbo_lite(state, config, balances, decimals, &mut rng), None)
            }
            Algorithm::Rebalance => {
                let tokens_per_sol = self.tokens_per_sol(token, config).await;
                (algorithms::decide_rebalance(config, balances, tokens_per_sol, decimals), None)
            }
            Algorithm::Smart => {
                let signals = self.signals.signals(&token.mint, decimals).await;
                let optimal = self.signals.optimal_signal(&token.mint, decimals).await;
                match (signals, optimal) {
                    (Some(signals), Some(optimal)) => (
                        algorithms::decide_smart(
                            state,
                            config,
                            balances,
                            &signals,
                            &optimal,
                            decimals,
                            Utc::now(),
                            self.settings.smart_mode_cooldown.as_millis() as u64,
                        ),
                        None,
                    ),
                    // No signal data yet: trade like the simple rotation.
                    _ => {
                        let mut rng = rand::rng();
                        (
                            algorithms::decide_simple(state, config, balances, decimals, &mut rng),
                            None,
                        )
                    }
                }
            }
            Algorithm::Dynamic => {
                match self.signals.signals(&token.mint, decimals).await {
                    Some(signals) => {
                        let base_buy = {
                            let mut rng = rand::rng();
                            draw_buy_amount(config, &mut rng)
                        };
                        let outcome = algorithms::decide_dynamic(
                            state, config, balances, &signals, base_buy, decimals,
                        );
                        (outcome.decision.clone(), Some(outcome))
                    }
                    None => {
                        let mut rng = rand::rng();
                        (
                            algorithms::decide_simple(state, config, balances, decimals, &mut rng),
                            None,
                        )
                    }
                }
            }
            Algorithm::TwapVwap => {
                let volume_ratio = if config.twap.vwap_weighting {
                    self.observe_volume_ratio(&token.mint).await
                } else {
                    None
                };
                (
                    algorithms::decide_twap_vwap(state, config, balances, volume_ratio, decimals),
                    None,
                )
            }
        }
    }

    async fn apply_decision(
        &self,
        token: &Token,
        config: &TokenConfig,
        state: &mut FlywheelState,
        balances: Balances,
        decision: TradeDecision,
        dynamic: Option<DynamicOutcome>,
    ) -> Result<bool> {
        let now = Utc::now();

        // Dynamic bookkeeping applies whatever the trade outcome: the
        // condition was observed either way.
        if let Some(outcome) = &dynamic {
            state.last_condition = Some(outcome.condition);
        }

        let traded = match decision {
            TradeDecision::Skip { reason } => {
                self.record_check(state, reason).await?;
                false
            }
            TradeDecision::ResetCycle { reason } => {
                state.reset_to_buy();
                self.record_check(state, reason).await?;
                false
            }
            TradeDecision::Pause { reason, until_secs } => {
                state.paused_until = Some(now + chrono::Duration::seconds(until_secs));
                self.record_check(state, reason).await?;
                false
            }
            TradeDecision::Buy { sol_amount, .. } => {
                match self.execute_swap(token, config, Side::Buy, sol_amount).await {
                    Ok(outcome) => {
                        if let Some(d) = &dynamic {
                            state.reserve_sol =
                                (state.reserve_sol + d.reserve_delta_sol).max(0.0);
                        }
                        self.after_buy(token, config, state, sol_amount, &outcome).await?;
                        true
                    }
                    Err(e) => {
                        self.after_trade_failure(token, state, TxKind::Buy, sol_amount, &e)
                            .await?;
                        false
                    }
                }
            }
            TradeDecision::Sell { token_amount, .. } => {
                let amount = token_amount.min(balances.ops_tokens);
                match self.execute_swap(token, config, Side::Sell, amount).await {
                    Ok(outcome) => {
                        self.after_sell(token, config, state, amount, &outcome).await?;
                        true
                    }
                    Err(e) => {
                        self.after_trade_failure(token, state, TxKind::Sell, amount, &e).await?;
                        false
                    }
                }
            }
        };

        Ok(traded)
    }

    /// Quote and execute one swap through the ops wallet. `amount` is SOL
    /// for buys and whole tokens for sells.
    async fn execute_swap(
        &self,
        token: &Token,
        config: &TokenConfig,
        side: Side,
        amount: f64,
    ) -> Result<ExecOutcome, EngineError> {
        let (input_mint, output_mint) = mint_pair_for(side, &token.mint);
        let amount_atomic = match side {
            Side::Buy => sol_to_lamports(amount),
            Side::Sell => (amount * 10f64.powi(token.decimals as i32)) as u64,
        };
        if amount_atomic == 0 {
            return Err(EngineError::Other("zero-size trade".into()));
        }

        let quote = self
            .amm
            .quote(&input_mint, &output_mint, amount_atomic, config.slippage_bps)
            .await?;
        let swap = self.amm.swap_tx(&token.ops_wallet, &quote).await?;
        self.executor
            .execute_delegated(&token.ops_wallet, &swap.swap_transaction)
            .await
    }

    async fn after_buy(
        &self,
        token: &Token,
        config: &TokenConfig,
        state: &mut FlywheelState,
        sol_amount: f64,
        outcome: &ExecOutcome,
    ) -> Result<()> {
        let now = Utc::now();
        match config.algorithm {
            Algorithm::Simple | Algorithm::TurboLite | Algorithm::TwapVwap => {
                let cycle = self.buy_cycle_len(config);
                // Snapshot the post-buy balance when the phase flips so the
                // sell side is sliced evenly.
                let snapshot = if state.buy_count + 1 >= cycle {
                    self.chain
                        .get_token_balance(&token.ops_wallet, &token.mint)
                        .await
                        .unwrap_or(0.0)
                } else {
                    0.0
                };
                state.apply_buy(cycle, snapshot, now);
            }
            _ => {
                state.last_trade_at = Some(now);
                state.consecutive_failures = 0;
            }
        }
        state.last_checked_at = Some(now);
        state.last_check_result = Some("buy".into());
        self.store.save_state(state).await?;
        self.store
            .insert_transaction(
                &TransactionRecord::new(&token.id, TxKind::Buy, sol_amount)
                    .confirmed(&outcome.signature),
            )
            .await?;
        info!(token = %token.id, sol_amount, signature = %outcome.signature, "buy confirmed");
        Ok(())
    }

    async fn after_sell(
        &self,
        token: &Token,
        config: &TokenConfig,
        state: &mut FlywheelState,
        token_amount: f64,
        outcome: &ExecOutcome,
    ) -> Result<()> {
        let now = Utc::now();
        match config.algorithm {
            Algorithm::Simple | Algorithm::TurboLite | Algorithm::TwapVwap => {
                state.apply_sell(self.sell_cycle_len(config), now);
            }
            _ => {
                state.last_trade_at = Some(now);
                state.consecutive_failures = 0;
            }
        }
        state.last_checked_at = Some(now);
        state.last_check_result = Some("sell".into());
        self.store.save_state(state).await?;
        self.store
            .insert_transaction(
                &TransactionRecord::new(&token.id, TxKind::Sell, token_amount)
                    .confirmed(&outcome.signature),
            )
            .await?;
        info!(token = %token.id, token_amount, signature = %outcome.signature, "sell confirmed");
        Ok(())
    }

    async fn after_trade_failure(
        &self,
        token: &Token,
        state: &mut FlywheelState,
        kind: TxKind,
        amount: f64,
        error: &EngineError,
    ) -> Result<()> {
        // No route is a quiet skip, not a failure.
        if matches!(error, EngineError::QuoteUnavailable(_)) {
            debug!(token = %token.id, "no route: {error}");
            return self.record_check(state, "quote_unavailable").await;
        }
        let now = Utc::now();
        state.consecutive_failures += 1;
        state.last_checked_at = Some(now);
        state.last_check_result = Some("trade_failed".into());
        if state.consecutive_failures >= FAILURE_PAUSE_THRESHOLD {
            state.paused_until = Some(now + chrono::Duration::seconds(FAILURE_PAUSE_SECS));
            warn!(
                token = %token.id,
                failures = state.consecutive_failures,
                "pausing after repeated trade failures"
            );
        }
        self.store.save_state(state).await?;
        self.store
            .insert_transaction(
                &TransactionRecord::new(&token.id, kind, amount).failed(&error.to_string()),
            )
            .await?;
        warn!(token = %token.id, "trade failed: {error}");
        Ok(())
    }

    async fn record_check(&self, state: &mut FlywheelState, reason: &str) -> Result<()> {
        state.last_checked_at = Some(Utc::now());
        state.last_check_result = Some(reason.to_string());
        self.store.save_state(state).await?;
        Ok(())
    }

    fn buy_cycle_len(&self, config: &TokenConfig) -> u32 {
        match config.algorithm {
            Algorithm::TurboLite => TURBO_CYCLE,
            Algorithm::TwapVwap => config.twap.slices.max(1),
            _ => self.settings.buys_per_cycle,
        }
    }

    fn sell_cycle_len(&self, config: &TokenConfig) -> u32 {
        match config.algorithm {
            Algorithm::TurboLite => TURBO_CYCLE,
            Algorithm::TwapVwap => config.twap.slices.max(1),
            _ => self.settings.sells_per_cycle,
        }
    }

    /// Reference quote: how many whole tokens one SOL buys right now.
    async fn tokens_per_sol(&self, token: &Token, config: &TokenConfig) -> f64 {
        match self
            .amm
            .quote(
                &mint_pair_for(Side::Buy, &token.mint).0,
                &token.mint,
                sol_to_lamports(1.0),
                config.slippage_bps,
            )
            .await
        {
            Ok(quote) => quote.out_amount as f64 / 10f64.powi(token.decimals as i32),
            Err(e) => {
                debug!(token = %token.id, "reference quote unavailable: {e}");
                0.0
            }
        }
    }

    /// Observed 24 h volume against its trailing EMA; feeds VWAP weighting.
    async fn observe_volume_ratio(&self, mint: &str) -> Option<f64> {
        let stats = self.amm.market_stats(mint).await;
        let volume = stats.volume_24h_sol?;
        let mut ema_map = self.volume_ema.lock().await;
        let ema = ema_map.entry(mint.to_string()).or_insert(volume);
        let ratio = if *ema > 0.0 { volume / *ema } else { 1.0 };
        *ema = *ema * 0.8 + volume * 0.2;
        Some(ratio)
    }

    // ── Fee collection preflight ────────────────────────────────────

    /// Sweep accrued creator fees out of the dev wallet: the platform's
    /// cut to the platform ops wallet, the rest to the token's ops wallet.
    /// Failures here are logged and never block the trade step. Returns
    /// the observed dev balance when it was readable.
    async fn collect_dev_fees(&self, token: &Token) -> Option<f64> {
        let dev_sol = match self.chain.get_sol_balance(&token.dev_wallet).await {
            Ok(balance) => balance,
            Err(e) => {
                debug!(token = %token.id, "dev balance unavailable: {e}");
                return None;
            }
        };

        let transferable = dev_sol - self.settings.dev_wallet_min_reserve_sol;
        if transferable < self.settings.min_fee_threshold_sol {
            return Some(dev_sol);
        }

        let transferable_lamports = sol_to_lamports(transferable);
        let platform_cut = if token.source == TokenSource::Platform {
            0
        } else {
            (transferable_lamports as f64 * self.settings.platform_fee_percent / 100.0) as u64
        };
        let user_share = transferable_lamports - platform_cut;

        if platform_cut > 0
            && lamports_to_sol(platform_cut) >= MIN_TRANSFER_SOL
            && let Some(platform_wallet) = &self.settings.platform_ops_wallet
        {
            match self
                .executor
                .transfer_sol_delegated(&token.dev_wallet, platform_wallet, platform_cut)
                .await
            {
                Ok(outcome) => {
                    let record = TransactionRecord::new(
                        &token.id,
                        TxKind::Transfer,
                        lamports_to_sol(platform_cut),
                    )
                    .confirmed(&outcome.signature);
                    let _ = self.store.insert_transaction(&record).await;
                }
                Err(e) => warn!(token = %token.id, "platform fee transfer failed: {e}"),
            }
        }

        if lamports_to_sol(user_share) >= MIN_TRANSFER_SOL {
            match self
                .executor
                .transfer_sol_delegated(&token.dev_wallet, &token.ops_wallet, user_share)
                .await
            {
                Ok(outcome) => {
                    let record = TransactionRecord::new(
                        &token.id,
                        TxKind::Transfer,
                        lamports_to_sol(user_share),
                    )
                    .confirmed(&outcome.signature);
                    let _ = self.store.insert_transaction(&record).await;
                }
                Err(e) => warn!(token = %token.id, "ops share transfer failed: {e}"),
            }
        }

        Some(dev_sol)
    }

    // ── Reactive dispatch ───────────────────────────────────────────

    /// Counter-trade entry point for the reactive engine. Takes the
    /// opposite side of the observed swap, scaled and clamped per config.
    /// Returns None when the clamped size rounds to nothing.
    pub async fn execute_reactive_trade(
        &self,
        token: &Token,
        config: &TokenConfig,
        observed_side: Side,
        observed_sol: f64,
    ) -> Result<Option<ExecOutcome>> {
        let response_side = observed_side.opposite();
        let response_sol = observed_sol * config.reactive.scale_pct / 100.0;

        let mut state = self.store.get_or_init_state(&token.id).await?;
        let now = Utc::now();

        // `executed_amount` follows the history convention: SOL for buys,
        // token units for sells.
        let (outcome, executed_amount) = match response_side {
            Side::Buy => {
                let ops_sol = self.chain.get_sol_balance(&token.ops_wallet).await?;
                let cap = ops_sol * config.reactive.max_response_pct / 100.0;
                let amount = response_sol.min(cap);
                if sol_to_lamports(amount) == 0 || ops_sol < amount + 0.01 {
                    self.record_check(&mut state, "reactive_insufficient_sol").await?;
                    return Ok(None);
                }
                (self.execute_swap(token, config, Side::Buy, amount).await, amount)
            }
            Side::Sell => {
                let ops_tokens =
                    self.chain.get_token_balance(&token.ops_wallet, &token.mint).await?;
                let tokens_per_sol = self.tokens_per_sol(token, config).await;
                if tokens_per_sol <= 0.0 {
                    self.record_check(&mut state, "quote_unavailable").await?;
                    return Ok(None);
                }
                let cap = ops_tokens * config.reactive.max_response_pct / 100.0;
                let amount = (response_sol * tokens_per_sol).min(cap);
                if (amount * 10f64.powi(token.decimals as i32)) as u64 == 0 {
                    self.record_check(&mut state, "reactive_insufficient_tokens").await?;
                    return Ok(None);
                }
                (self.execute_swap(token, config, Side::Sell, amount).await, amount)
            }
        };

        match outcome {
            Ok(exec) => {
                state.last_trade_at = Some(now);
                state.last_checked_at = Some(now);
                state.last_check_result = Some("reactive_trade".into());
                state.consecutive_failures = 0;
                self.store.save_state(&state).await?;
                let kind = match response_side {
                    Side::Buy => TxKind::Buy,
                    Side::Sell => TxKind::Sell,
                };
                let mut record = TransactionRecord::new(&token.id, kind, executed_amount)
                    .confirmed(&exec.signature);
                record.detail = Some("reactive".into());
                self.store.insert_transaction(&record).await?;
                info!(
                    token = %token.id,
                    side = ?response_side,
                    observed_sol,
                    signature = %exec.signature,
                    "reactive counter-trade confirmed"
                );
                Ok(Some(exec))
            }
            Err(e) => {
                let kind = match response_side {
                    Side::Buy => TxKind::Buy,
                    Side::Sell => TxKind::Sell,
                };
                self.after_trade_failure(token, &mut state, kind, executed_amount, &e).await?;
                Ok(None)
            }
        }
    }
}

fn draw_buy_amount<R: rand::Rng>(config: &TokenConfig, rng: &mut R) -> f64 {
    if config.max_buy_sol > config.min_buy_sol {
        rng.random_range(config.min_buy_sol..=config.max_buy_sol)
    } else {
        config.min_buy_sol
    }
}
