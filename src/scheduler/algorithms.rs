use chrono::{DateTime, Utc};
use rand::Rng;

use crate::model::token_config::TokenConfig;
use crate::model::{FlywheelState, MarketCondition, TradePhase};
use crate::signal::MarketSignals;
use crate::signal::OptimalSignal;

/// Volatility beyond which the dynamic classifier halts trading entirely.
const EXTREME_VOLATILITY: f64 = 0.10;
/// SOL kept in the ops wallet on top of any buy, for fees and rent.
const OPS_FEE_HEADROOM_SOL: f64 = 0.01;
/// Per-trade cap on sells as a fraction of the token balance.
const SELL_BALANCE_CAP: f64 = 0.2;
/// Smart mode sells at most this fraction of the balance per trade.
const SMART_SELL_CAP: f64 = 0.4;
/// How long an extreme-volatility pause lasts.
pub const VOLATILITY_PAUSE_SECS: i64 = 300;

pub const TURBO_CYCLE: u32 = 3;

/// Wallet balances the decision functions work from.
#[derive(Debug, Clone, Copy)]
pub struct Balances {
    pub ops_sol: f64,
    /// Whole tokens (already scaled by decimals).
    pub ops_tokens: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStyle {
    Instant,
    Twap,
    Vwap,
}

/// What one flywheel tick should do for a token. At most one trade per
/// invocation; everything else is a recorded no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    Buy { sol_amount: f64, style: ExecStyle },
    /// `token_amount` in whole tokens.
    Sell { token_amount: f64, style: ExecStyle },
    /// Nothing to do this tick; `reason` becomes `last_check_result`.
    Skip { reason: &'static str },
    /// Sell phase can no longer proceed (dust or empty); restart buying.
    ResetCycle { reason: &'static str },
    /// Stop trading this token for a while.
    Pause { reason: &'static str, until_secs: i64 },
}

/// Outcome of the dynamic algorithm: the trade plus reserve bookkeeping.
#[derive(Debug, Clone)]
pub struct DynamicOutcome {
    pub decision: TradeDecision,
    pub condition: MarketCondition,
    /// Positive: park this much SOL in reserve. Negative: deployed from it.
    pub reserve_delta_sol: f64,
}

fn to_atomic(amount: f64, decimals: u8) -> u64 {
    (amount * 10f64.powi(decimals as i32)) as u64
}

/// Cap a sell against the configured max and the live balance.
fn capped_sell(amount: f64, balance: f64, config: &TokenConfig) -> f64 {
    let mut out = amount.min(balance);
    if config.max_sell_tokens > 0.0 {
        out = out.min(config.max_sell_tokens);
    }
    out
}

// ── Simple rotation ─────────────────────────────────────────────────

/// Fixed rotation: `buys_per_cycle` uniform-random buys, then the token
/// position is sold off in `sells_per_cycle` even slices.
pub fn decide_simple<R: Rng>(
    state: &FlywheelState,
    config: &TokenConfig,
    balances: Balances,
    decimals: u8,
    rng: &mut R,
) -> TradeDecision {
    match state.phase {
        TradePhase::Buy => {
            if balances.ops_sol < config.min_buy_sol + OPS_FEE_HEADROOM_SOL {
                return TradeDecision::Skip { reason: "insufficient_sol" };
            }
            let sol_amount = if config.max_buy_sol > config.min_buy_sol {
                rng.random_range(config.min_buy_sol..=config.max_buy_sol)
            } else {
                config.min_buy_sol
            };
            TradeDecision::Buy { sol_amount, style: ExecStyle::Instant }
        }
        TradePhase::Sell => {
            if balances.ops_tokens <= 0.0 {
                return TradeDecision::ResetCycle { reason: "no_tokens" };
            }
            let amount = capped_sell(state.sell_amount_per_tx, balances.ops_tokens, config);
            if to_atomic(amount, decimals) < 1 {
                return TradeDecision::ResetCycle { reason: "insufficient_tokens" };
            }
            TradeDecision::Sell { token_amount: amount, style: ExecStyle::Instant }
        }
    }
}

// ── Turbo lite ──────────────────────────────────────────────────────

/// Compressed rotation: 3/3 cycle, buy sizes skewed toward the low end of
/// the configured range.
pub fn decide_turbo_lite<R: Rng>(
    state: &FlywheelState,
    config: &TokenConfig,
    balances: Balances,
    decimals: u8,
    rng: &mut R,
) -> TradeDecision {
    match state.phase {
        TradePhase::Buy => {
            if balances.ops_sol < config.min_buy_sol + OPS_FEE_HEADROOM_SOL {
                return TradeDecision::Skip { reason: "insufficient_sol" };
            }
            let r: f64 = rng.random_range(0.0..1.0);
            let span = (config.max_buy_sol - config.min_buy_sol).max(0.0);
            let sol_amount = config.min_buy_sol + span * r * r;
            TradeDecision::Buy { sol_amount, style: ExecStyle::Instant }
        }
        TradePhase::Sell => {
            if balances.ops_tokens <= 0.0 {
                return TradeDecision::ResetCycle { reason: "no_tokens" };
            }
            let amount = capped_sell(state.sell_amount_per_tx, balances.ops_tokens, config);
            if to_atomic(amount, decimals) < 1 {
                return TradeDecision::ResetCycle { reason: "insufficient_tokens" };
            }
            TradeDecision::Sell { token_amount: amount, style: ExecStyle::Instant }
        }
    }
}

// ── Allocation rebalance ────────────────────────────────────────────

/// Trade toward the target SOL/token split once the deviation clears the
/// threshold. Corrects half the excess per tick, sells capped at 20% of
/// the balance.
pub fn decide_rebalance(
    config: &TokenConfig,
    balances: Balances,
    tokens_per_sol: f64,
    decimals: u8,
) -> TradeDecision {
    if tokens_per_sol <= 0.0 {
        return TradeDecision::Skip { reason: "quote_unavailable" };
    }
    let token_value_sol = balances.ops_tokens / tokens_per_sol;
    let total = balances.ops_sol + token_value_sol;
    if total <= 0.0 {
        return TradeDecision::Skip { reason: "no_tokens" };
    }

    let current_sol_pct = balances.ops_sol / total * 100.0;
    let target = config.rebalance.target_sol_pct;
    let deviation = current_sol_pct - target;
    if deviation.abs() < config.rebalance.threshold_pct {
        return TradeDecision::Skip { reason: "balanced" };
    }

    if deviation > 0.0 {
        // Too much SOL: buy half the excess, inside the configured bounds.
        let excess_sol = deviation / 100.0 * total;
        let sol_amount = (excess_sol * 0.5).min(config.max_buy_sol);
        if sol_amount < config.min_buy_sol {
            return TradeDecision::Skip { reason: "below_min_buy" };
        }
        if balances.ops_sol < sol_amount + OPS_FEE_HEADROOM_SOL {
            return TradeDecision::Skip { reason: "insufficient_sol" };
        }
        TradeDecision::Buy { sol_amount, style: ExecStyle::Instant }
    } else {
        // Too many tokens: sell half the excess value, capped per trade.
        let excess_value_sol = -deviation / 100.0 * total;
        let amount = (excess_value_sol * 0.5 * tokens_per_sol)
            .min(balances.ops_tokens * SELL_BALANCE_CAP);
        let amount = capped_sell(amount, balances.ops_tokens, config);
        if to_atomic(amount, decimals) < 1 {
            return TradeDecision::Skip { reason: "insufficient_tokens" };
        }
        TradeDecision::Sell { token_amount: amount, style: ExecStyle::Instant }
    }
}

// ── Smart (signal-driven) ───────────────────────────────────────────

/// Confidence-gated trading on the signal engine's suggestion, under a
/// per-token cooldown persisted in `last_trade_at`.
pub fn decide_smart(
    state: &FlywheelState,
    config: &TokenConfig,
    balances: Balances,
    signals: &MarketSignals,
    optimal: &OptimalSignal,
    decimals: u8,
    now: DateTime<Utc>,
    cooldown_ms: u64,
) -> TradeDecision {
    if let Some(last) = state.last_trade_at {
        let elapsed_ms = (now - last).num_milliseconds();
        if elapsed_ms >= 0 && (elapsed_ms as u64) < cooldown_ms {
            return TradeDecision::Skip { reason: "cooldown" };
        }
    }

    if signals.volatility_is_high && !optimal.action.is_strong() {
        return TradeDecision::Skip { reason: "high_volatility" };
    }

    let threshold = if optimal.action.is_strong() { 40.0 } else { 50.0 };
    if optimal.confidence < threshold {
        return TradeDecision::Skip { reason: "low_confidence" };
    }

    if optimal.action.is_buy() {
        let sized = balances.ops_sol * signals.suggested_position_size_pct / 100.0;
        let sol_amount = sized.clamp(config.min_buy_sol, config.max_buy_sol);
        if balances.ops_sol < sol_amount + OPS_FEE_HEADROOM_SOL {
            return TradeDecision::Skip { reason: "insufficient_sol" };
        }
        TradeDecision::Buy { sol_amount, style: ExecStyle::Instant }
    } else if optimal.action.is_sell() {
        let sized = balances.ops_tokens * signals.suggested_position_size_pct / 100.0;
        let amount = capped_sell(
            sized.min(balances.ops_tokens * SMART_SELL_CAP),
            balances.ops_tokens,
            config,
        );
        if to_atomic(amount, decimals) < 1 {
            return TradeDecision::Skip { reason: "insufficient_tokens" };
        }
        TradeDecision::Sell { token_amount: amount, style: ExecStyle::Instant }
    } else {
        TradeDecision::Skip { reason: "hold" }
    }
}

// ── Dynamic (condition-based) ───────────────────────────────────────

/// Classify the market from the signal snapshot.
pub fn classify_market(signals: &MarketSignals) -> MarketCondition {
    if signals.volatility >= EXTREME_VOLATILITY {
        MarketCondition::ExtremeVolatility
    } else if signals.change_pct >= 15.0 {
        MarketCondition::Pump
    } else if signals.change_pct <= -15.0 {
        MarketCondition::Dump
    } else if signals.volatility_is_high && signals.change_pct.abs() < 5.0 {
        MarketCondition::Ranging
    } else {
        MarketCondition::Normal
    }
}

/// Condition table:
///
/// pump          → sell 90% of per-trade capacity, instant
/// dump          → buy 70% (80% boosted) of base, twap, adverse reserve
/// ranging       → buy (100 − normal reserve)%, vwap
/// normal        → buy (100 − normal reserve)%, instant
/// extreme vol.  → pause
///
/// Half the reserve deploys on an adverse → favorable transition when the
/// next action is a buy.
pub fn decide_dynamic(
    state: &FlywheelState,
    config: &TokenConfig,
    balances: Balances,
    signals: &MarketSignals,
    base_buy_sol: f64,
    decimals: u8,
) -> DynamicOutcome {
    let condition = classify_market(signals);
    let was_adverse = state.last_condition.is_some_and(|c| c.is_adverse());
    let favorable_transition = was_adverse && !condition.is_adverse();

    match condition {
        MarketCondition::ExtremeVolatility => DynamicOutcome {
            decision: TradeDecision::Pause {
                reason: "extreme_volatility",
                until_secs: VOLATILITY_PAUSE_SECS,
            },
            condition,
            reserve_delta_sol: 0.0,
        },
        MarketCondition::Pump => {
            // Sell into strength; retain a tenth of the capacity.
            let capacity = balances.ops_tokens * SELL_BALANCE_CAP;
            let amount = capped_sell(capacity * 0.90, balances.ops_tokens, config);
            let decision = if to_atomic(amount, decimals) < 1 {
                TradeDecision::Skip { reason: "insufficient_tokens" }
            } else {
                TradeDecision::Sell { token_amount: amount, style: ExecStyle::Instant }
            };
            DynamicOutcome { decision, condition, reserve_delta_sol: 0.0 }
        }
        MarketCondition::Dump => {
            let buyback_pct = if config.dynamic.buyback_boost { 80.0 } else { 70.0 };
            let reserve_pct = config.dynamic.reserve_pct_adverse.min(100.0 - buyback_pct);
            buy_with_reserve(
                config,
                balances,
                base_buy_sol,
                buyback_pct,
                reserve_pct,
                ExecStyle::Twap,
                condition,
                false,
                state.reserve_sol,
            )
        }
        MarketCondition::Ranging => buy_with_reserve(
            config,
            balances,
            base_buy_sol,
            100.0 - config.dynamic.reserve_pct_normal,
            config.dynamic.reserve_pct_normal,
            ExecStyle::Vwap,
            condition,
            favorable_transition,
            state.reserve_sol,
        ),
        MarketCondition::Normal => buy_with_reserve(
            config,
            balances,
            base_buy_sol,
            100.0 - config.dynamic.reserve_pct_normal,
            config.dynamic.reserve_pct_normal,
            ExecStyle::Instant,
            condition,
            favorable_transition,
            state.reserve_sol,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn buy_with_reserve(
    config: &TokenConfig,
    balances: Balances,
    base_buy_sol: f64,
    buyback_pct: f64,
    reserve_pct: f64,
    style: ExecStyle,
    condition: MarketCondition,
    favorable_transition: bool,
    reserve_sol: f64,
) -> DynamicOutcome {
    let mut spend = base_buy_sol * buyback_pct / 100.0;
    let mut reserve_delta = base_buy_sol * reserve_pct / 100.0;

    if favorable_transition && reserve_sol >= 0.01 {
        let deployed = reserve_sol * 0.5;
        spend += deployed;
        reserve_delta -= deployed;
    }

    if spend < config.min_buy_sol.min(base_buy_sol) || spend <= 0.0 {
        return DynamicOutcome {
            decision: TradeDecision::Skip { reason: "below_min_buy" },
            condition,
            reserve_delta_sol: 0.0,
        };
    }
    if balances.ops_sol < spend + reserve_delta.max(0.0) + OPS_FEE_HEADROOM_SOL {
        return DynamicOutcome {
            decision: TradeDecision::Skip { reason: "insufficient_sol" },
            condition,
            reserve_delta_sol: 0.0,
        };
    }

    DynamicOutcome {
        decision: TradeDecision::Buy { sol_amount: spend, style },
        condition,
        reserve_delta_sol: reserve_delta,
    }
}

// ── TWAP / VWAP slicing ─────────────────────────────────────────────

/// One fixed-size slice per tick. `volume_ratio` (observed 24 h volume
/// over its trailing average) weights the slice in VWAP mode.
pub fn decide_twap_vwap(
    state: &FlywheelState,
    config: &TokenConfig,
    balances: Balances,
    volume_ratio: Option<f64>,
    decimals: u8,
) -> TradeDecision {
    let slices = config.twap.slices.max(1);
    match state.phase {
        TradePhase::Buy => {
            let mut slice = config.twap.total_sol / slices as f64;
            if config.twap.vwap_weighting
                && let Some(ratio) = volume_ratio
            {
                slice *= ratio.clamp(0.5, 2.0);
            }
            if slice <= 0.0 {
                return TradeDecision::Skip { reason: "below_min_buy" };
            }
            if balances.ops_sol < slice + OPS_FEE_HEADROOM_SOL {
                return TradeDecision::Skip { reason: "insufficient_sol" };
            }
            let style =
                if config.twap.vwap_weighting { ExecStyle::Vwap } else { ExecStyle::Twap };
            TradeDecision::Buy { sol_amount: slice, style }
        }
        TradePhase::Sell => {
            if balances.ops_tokens <= 0.0 {
                return TradeDecision::ResetCycle { reason: "no_tokens" };
            }
            let amount = capped_sell(state.sell_amount_per_tx, balances.ops_tokens, config);
            if to_atomic(amount, decimals) < 1 {
                return TradeDecision::ResetCycle { reason: "insufficient_tokens" };
            }
            let style =
                if config.twap.vwap_weighting { ExecStyle::Vwap } else { ExecStyle::Twap };
            TradeDecision::Sell { token_amount: amount, style }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalAction, TrendDirection};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config() -> TokenConfig {
        TokenConfig::defaults_for("t1")
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn signals(change_pct: f64, vol: f64) -> MarketSignals {
        MarketSignals {
            direction: TrendDirection::Flat,
            strength: 0.0,
            rsi: 50.0,
            volatility: vol,
            volatility_is_high: vol > 0.05,
            change_pct,
            suggested_position_size_pct: 10.0,
        }
    }

    // ── simple ──

    #[test]
    fn simple_buy_within_bounds() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        for _ in 0..50 {
            match decide_simple(&state, &cfg, balances, 6, &mut rng()) {
                TradeDecision::Buy { sol_amount, .. } => {
                    assert!(sol_amount >= cfg.min_buy_sol && sol_amount <= cfg.max_buy_sol);
                }
                other => panic!("expected buy, got {other:?}"),
            }
        }
    }

    #[test]
    fn simple_buy_boundary_headroom() {
        let state = FlywheelState::initial("t1");
        let mut cfg = config();
        cfg.min_buy_sol = 0.01;
        cfg.max_buy_sol = 0.01;

        // exactly min_buy + 0.01 → buys exactly min_buy
        let ok = Balances { ops_sol: 0.02, ops_tokens: 0.0 };
        assert_eq!(
            decide_simple(&state, &cfg, ok, 6, &mut rng()),
            TradeDecision::Buy { sol_amount: 0.01, style: ExecStyle::Instant }
        );

        // a hair under → skip
        let short = Balances { ops_sol: 0.019, ops_tokens: 0.0 };
        assert_eq!(
            decide_simple(&state, &cfg, short, 6, &mut rng()),
            TradeDecision::Skip { reason: "insufficient_sol" }
        );
    }

    #[test]
    fn simple_sell_uses_snapshot_slice() {
        let mut state = FlywheelState::initial("t1");
        for _ in 0..5 {
            state.apply_buy(5, 1000.0, Utc::now());
        }
        assert_eq!(state.phase, TradePhase::Sell);

        let cfg = config();
        let balances = Balances { ops_sol: 0.5, ops_tokens: 900.0 };
        match decide_simple(&state, &cfg, balances, 6, &mut rng()) {
            TradeDecision::Sell { token_amount, .. } => assert_eq!(token_amount, 200.0),
            other => panic!("expected sell, got {other:?}"),
        }

        // balance below the slice → sell what's left
        let low = Balances { ops_sol: 0.5, ops_tokens: 150.0 };
        match decide_simple(&state, &cfg, low, 6, &mut rng()) {
            TradeDecision::Sell { token_amount, .. } => assert_eq!(token_amount, 150.0),
            other => panic!("expected sell, got {other:?}"),
        }
    }

    #[test]
    fn simple_sell_dust_resets() {
        let mut state = FlywheelState::initial("t1");
        for _ in 0..5 {
            state.apply_buy(5, 0.0000001, Utc::now());
        }
        let cfg = config();

        let empty = Balances { ops_sol: 0.5, ops_tokens: 0.0 };
        assert_eq!(
            decide_simple(&state, &cfg, empty, 6, &mut rng()),
            TradeDecision::ResetCycle { reason: "no_tokens" }
        );

        let dust = Balances { ops_sol: 0.5, ops_tokens: 0.0000001 };
        assert_eq!(
            decide_simple(&state, &cfg, dust, 6, &mut rng()),
            TradeDecision::ResetCycle { reason: "insufficient_tokens" }
        );
    }

    // ── turbo ──

    #[test]
    fn turbo_skews_low() {
        let state = FlywheelState::initial("t1");
        let mut cfg = config();
        cfg.min_buy_sol = 0.01;
        cfg.max_buy_sol = 0.11;
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };

        let mut rng = rng();
        let mut total = 0.0;
        for _ in 0..200 {
            if let TradeDecision::Buy { sol_amount, .. } =
                decide_turbo_lite(&state, &cfg, balances, 6, &mut rng)
            {
                assert!((0.01..=0.11).contains(&sol_amount));
                total += sol_amount;
            } else {
                panic!("expected buy");
            }
        }
        // r² skew: mean lands well below the uniform midpoint of 0.06
        assert!(total / 200.0 < 0.055);
    }

    // ── rebalance ──

    #[test]
    fn rebalance_balanced_skips() {
        let cfg = config(); // 50/50, threshold 5
        // 1 SOL + 1 SOL worth of tokens at 1000 tokens/SOL
        let balances = Balances { ops_sol: 1.0, ops_tokens: 1000.0 };
        assert_eq!(
            decide_rebalance(&cfg, balances, 1000.0, 6),
            TradeDecision::Skip { reason: "balanced" }
        );
    }

    #[test]
    fn rebalance_excess_sol_buys_half() {
        let mut cfg = config();
        cfg.max_buy_sol = 10.0;
        // 80/20 split of a 10 SOL book, target 50 → excess 3 SOL, buys 1.5
        let balances = Balances { ops_sol: 8.0, ops_tokens: 2000.0 };
        match decide_rebalance(&cfg, balances, 1000.0, 6) {
            TradeDecision::Buy { sol_amount, .. } => {
                assert!((sol_amount - 1.5).abs() < 1e-9);
            }
            other => panic!("expected buy, got {other:?}"),
        }
    }

    #[test]
    fn rebalance_excess_tokens_sells_capped() {
        let cfg = config();
        // 20/80 split: excess token value 3 SOL → half is 1.5 SOL = 1500
        // tokens, but 20% of 8000 = 1600 is the cap, so 1500 stands.
        let balances = Balances { ops_sol: 2.0, ops_tokens: 8000.0 };
        match decide_rebalance(&cfg, balances, 1000.0, 6) {
            TradeDecision::Sell { token_amount, .. } => {
                assert!((token_amount - 1500.0).abs() < 1e-6);
            }
            other => panic!("expected sell, got {other:?}"),
        }

        // steeper imbalance hits the 20% cap
        let skewed = Balances { ops_sol: 0.5, ops_tokens: 20000.0 };
        match decide_rebalance(&cfg, skewed, 1000.0, 6) {
            TradeDecision::Sell { token_amount, .. } => {
                assert!((token_amount - 4000.0).abs() < 1e-6);
            }
            other => panic!("expected sell, got {other:?}"),
        }
    }

    #[test]
    fn rebalance_no_route_skips() {
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 1000.0 };
        assert_eq!(
            decide_rebalance(&cfg, balances, 0.0, 6),
            TradeDecision::Skip { reason: "quote_unavailable" }
        );
    }

    // ── smart ──

    #[test]
    fn smart_cooldown_blocks() {
        let mut state = FlywheelState::initial("t1");
        let now = Utc::now();
        state.last_trade_at = Some(now - chrono::Duration::minutes(2));
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let s = signals(0.0, 0.01);
        let optimal = OptimalSignal {
            action: SignalAction::Buy,
            confidence: 80.0,
            reasons: vec![],
        };
        assert_eq!(
            decide_smart(&state, &cfg, balances, &s, &optimal, 6, now, 300_000),
            TradeDecision::Skip { reason: "cooldown" }
        );

        // five minutes later the same signal trades
        let later = now + chrono::Duration::minutes(4);
        assert!(matches!(
            decide_smart(&state, &cfg, balances, &s, &optimal, 6, later, 300_000),
            TradeDecision::Buy { .. }
        ));
    }

    #[test]
    fn smart_high_volatility_needs_strong_signal() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let s = signals(0.0, 0.08);

        let weak = OptimalSignal { action: SignalAction::Buy, confidence: 90.0, reasons: vec![] };
        assert_eq!(
            decide_smart(&state, &cfg, balances, &s, &weak, 6, Utc::now(), 300_000),
            TradeDecision::Skip { reason: "high_volatility" }
        );

        let strong =
            OptimalSignal { action: SignalAction::StrongBuy, confidence: 45.0, reasons: vec![] };
        assert!(matches!(
            decide_smart(&state, &cfg, balances, &s, &strong, 6, Utc::now(), 300_000),
            TradeDecision::Buy { .. }
        ));
    }

    #[test]
    fn smart_confidence_thresholds() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let s = signals(0.0, 0.01);

        let weak = OptimalSignal { action: SignalAction::Buy, confidence: 49.0, reasons: vec![] };
        assert_eq!(
            decide_smart(&state, &cfg, balances, &s, &weak, 6, Utc::now(), 300_000),
            TradeDecision::Skip { reason: "low_confidence" }
        );

        let strong =
            OptimalSignal { action: SignalAction::StrongBuy, confidence: 41.0, reasons: vec![] };
        assert!(matches!(
            decide_smart(&state, &cfg, balances, &s, &strong, 6, Utc::now(), 300_000),
            TradeDecision::Buy { .. }
        ));
    }

    #[test]
    fn smart_sell_capped_at_forty_pct() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 1000.0 };
        let mut s = signals(0.0, 0.01);
        s.suggested_position_size_pct = 90.0;
        let optimal =
            OptimalSignal { action: SignalAction::Sell, confidence: 80.0, reasons: vec![] };
        match decide_smart(&state, &cfg, balances, &s, &optimal, 6, Utc::now(), 300_000) {
            TradeDecision::Sell { token_amount, .. } => assert_eq!(token_amount, 400.0),
            other => panic!("expected sell, got {other:?}"),
        }
    }

    // ── dynamic ──

    #[test]
    fn classification_table() {
        assert_eq!(classify_market(&signals(20.0, 0.01)), MarketCondition::Pump);
        assert_eq!(classify_market(&signals(-20.0, 0.01)), MarketCondition::Dump);
        assert_eq!(classify_market(&signals(1.0, 0.07)), MarketCondition::Ranging);
        assert_eq!(classify_market(&signals(1.0, 0.01)), MarketCondition::Normal);
        assert_eq!(
            classify_market(&signals(1.0, 0.15)),
            MarketCondition::ExtremeVolatility
        );
        // extreme volatility wins over pump-sized moves
        assert_eq!(
            classify_market(&signals(30.0, 0.12)),
            MarketCondition::ExtremeVolatility
        );
    }

    #[test]
    fn dynamic_pump_sells_ninety_pct_of_capacity() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 1000.0 };
        let out = decide_dynamic(&state, &cfg, balances, &signals(20.0, 0.01), 0.05, 6);
        assert_eq!(out.condition, MarketCondition::Pump);
        match out.decision {
            TradeDecision::Sell { token_amount, style } => {
                assert_eq!(style, ExecStyle::Instant);
                // 20% capacity × 90%
                assert!((token_amount - 180.0).abs() < 1e-9);
            }
            other => panic!("expected sell, got {other:?}"),
        }
    }

    #[test]
    fn dynamic_dump_buys_via_twap_and_reserves() {
        let state = FlywheelState::initial("t1");
        let cfg = config(); // adverse reserve 40, boost off
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let out = decide_dynamic(&state, &cfg, balances, &signals(-20.0, 0.01), 0.1, 6);
        match out.decision {
            TradeDecision::Buy { sol_amount, style } => {
                assert_eq!(style, ExecStyle::Twap);
                assert!((sol_amount - 0.07).abs() < 1e-9); // 70% of base
            }
            other => panic!("expected buy, got {other:?}"),
        }
        // reserve capped at the unspent 30%
        assert!((out.reserve_delta_sol - 0.03).abs() < 1e-9);
    }

    #[test]
    fn dynamic_extreme_pauses() {
        let state = FlywheelState::initial("t1");
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 100.0 };
        let out = decide_dynamic(&state, &cfg, balances, &signals(0.0, 0.2), 0.05, 6);
        assert_eq!(
            out.decision,
            TradeDecision::Pause { reason: "extreme_volatility", until_secs: 300 }
        );
    }

    #[test]
    fn dynamic_deploys_reserve_on_recovery() {
        let mut state = FlywheelState::initial("t1");
        state.last_condition = Some(MarketCondition::Dump);
        state.reserve_sol = 0.2;
        let cfg = config(); // normal reserve 20
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let out = decide_dynamic(&state, &cfg, balances, &signals(1.0, 0.01), 0.1, 6);
        match out.decision {
            TradeDecision::Buy { sol_amount, .. } => {
                // 80% of base (0.08) plus half the reserve (0.1)
                assert!((sol_amount - 0.18).abs() < 1e-9);
            }
            other => panic!("expected buy, got {other:?}"),
        }
        // 0.02 parked minus 0.1 deployed
        assert!((out.reserve_delta_sol + 0.08).abs() < 1e-9);
    }

    #[test]
    fn dynamic_small_reserve_stays_parked() {
        let mut state = FlywheelState::initial("t1");
        state.last_condition = Some(MarketCondition::Dump);
        state.reserve_sol = 0.005; // under the 0.01 floor
        let cfg = config();
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        let out = decide_dynamic(&state, &cfg, balances, &signals(1.0, 0.01), 0.1, 6);
        match out.decision {
            TradeDecision::Buy { sol_amount, .. } => {
                assert!((sol_amount - 0.08).abs() < 1e-9);
            }
            other => panic!("expected buy, got {other:?}"),
        }
        assert!(out.reserve_delta_sol > 0.0);
    }

    // ── twap/vwap ──

    #[test]
    fn twap_even_slices() {
        let state = FlywheelState::initial("t1");
        let cfg = config(); // total 0.5, 10 slices
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };
        assert_eq!(
            decide_twap_vwap(&state, &cfg, balances, None, 6),
            TradeDecision::Buy { sol_amount: 0.05, style: ExecStyle::Twap }
        );
    }

    #[test]
    fn vwap_weights_clamped() {
        let state = FlywheelState::initial("t1");
        let mut cfg = config();
        cfg.twap.vwap_weighting = true;
        let balances = Balances { ops_sol: 1.0, ops_tokens: 0.0 };

        match decide_twap_vwap(&state, &cfg, balances, Some(5.0), 6) {
            TradeDecision::Buy { sol_amount, style } => {
                assert_eq!(style, ExecStyle::Vwap);
                assert!((sol_amount - 0.1).abs() < 1e-9); // clamp at 2×
            }
            other => panic!("expected buy, got {other:?}"),
        }

        match decide_twap_vwap(&state, &cfg, balances, Some(0.1), 6) {
            TradeDecision::Buy { sol_amount, .. } => {
                assert!((sol_amount - 0.025).abs() < 1e-9); // clamp at 0.5×
            }
            other => panic!("expected buy, got {other:?}"),
        }
    }
}
