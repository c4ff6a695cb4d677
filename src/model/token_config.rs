use serde::{Deserialize, Serialize};

/// Which trading algorithm drives a token's flywheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Fixed rotation: 5 buys then 5 sells.
    Simple,
    /// Hold a target SOL/token allocation, trade toward it past a threshold.
    Rebalance,
    /// Signal-driven with confidence gating and a 5-minute cooldown.
    Smart,
    /// Compressed rotation (3/3), low-skewed sizes, no interval floor.
    TurboLite,
    /// Fixed- or volume-weighted slices of a configured total.
    TwapVwap,
    /// Market-condition classifier with buyback/reserve percentages.
    Dynamic,
    /// Trades only in reaction to observed third-party swaps.
    TransactionReactive,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Simple => "simple",
            Algorithm::Rebalance => "rebalance",
            Algorithm::Smart => "smart",
            Algorithm::TurboLite => "turbo_lite",
            Algorithm::TwapVwap => "twap_vwap",
            Algorithm::Dynamic => "dynamic",
            Algorithm::TransactionReactive => "transaction_reactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Algorithm::Simple),
            "rebalance" => Some(Algorithm::Rebalance),
            "smart" => Some(Algorithm::Smart),
            "turbo_lite" => Some(Algorithm::TurboLite),
            "twap_vwap" => Some(Algorithm::TwapVwap),
            "dynamic" => Some(Algorithm::Dynamic),
            "transaction_reactive" => Some(Algorithm::TransactionReactive),
            _ => None,
        }
    }
}

/// Reactive-mode tuning. Only consulted when the algorithm is
/// `transaction_reactive` and `enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactiveParams {
    pub enabled: bool,
    /// Observed swaps below this SOL size are ignored.
    pub min_trigger_sol: f64,
    /// Counter-trade size as a percentage of the observed swap.
    pub scale_pct: f64,
    /// Cap on the response as a percentage of the ops wallet balance.
    pub max_response_pct: f64,
    pub cooldown_ms: u64,
}

impl Default for ReactiveParams {
    fn default() -> Self {
        ReactiveParams {
            enabled: false,
            min_trigger_sol: 0.1,
            scale_pct: 50.0,
            max_response_pct: 30.0,
            cooldown_ms: 30_000,
        }
    }
}

/// Allocation targets for the rebalance algorithm. Percentages of total
/// ops-wallet value; must sum to at most 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceParams {
    pub target_sol_pct: f64,
    pub target_token_pct: f64,
    /// Dead band: no trade while the deviation stays inside it.
    pub threshold_pct: f64,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        RebalanceParams { target_sol_pct: 50.0, target_token_pct: 50.0, threshold_pct: 5.0 }
    }
}

/// TWAP/VWAP slicing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapParams {
    /// Total SOL to work through per rotation direction.
    pub total_sol: f64,
    /// Number of slices; also the cycle length per phase.
    pub slices: u32,
    /// Weight slices by observed volume (VWAP) instead of evenly (TWAP).
    pub vwap_weighting: bool,
}

impl Default for TwapParams {
    fn default() -> Self {
        TwapParams { total_sol: 0.5, slices: 10, vwap_weighting: false }
    }
}

/// Dynamic-mode reserve and volatility tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicParams {
    /// Share of each buy retained as reserve in normal/ranging markets.
    pub reserve_pct_normal: f64,
    /// Share retained while the market is adverse.
    pub reserve_pct_adverse: f64,
    /// Lift dump-condition buybacks from 70% to 80%.
    pub buyback_boost: bool,
}

impl Default for DynamicParams {
    fn default() -> Self {
        DynamicParams { reserve_pct_normal: 20.0, reserve_pct_adverse: 40.0, buyback_boost: false }
    }
}

/// Per-token tuning. One row per token; owner-mutable through admin
/// control, read by the schedulers on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token_id: String,
    pub algorithm: Algorithm,
    pub min_buy_sol: f64,
    pub max_buy_sol: f64,
    pub max_sell_tokens: f64,
    pub slippage_bps: u16,
    /// Floor between two flywheel trades for this token. Zero disables.
    pub buy_interval_secs: u64,
    pub flywheel_active: bool,
    pub market_making_enabled: bool,
    pub auto_claim_enabled: bool,
    /// Slow-cycle claim threshold.
    pub fee_threshold_sol: f64,
    pub reactive: ReactiveParams,
    pub rebalance: RebalanceParams,
    pub twap: TwapParams,
    pub dynamic: DynamicParams,
}

impl TokenConfig {
    /// Defaults applied to a freshly launched token: simple algorithm,
    /// flywheel on, modest bounds.
    pub fn defaults_for(token_id: &str) -> Self {
        TokenConfig {
            token_id: token_id.to_string(),
            algorithm: Algorithm::Simple,
            min_buy_sol: 0.01,
            max_buy_sol: 0.05,
            max_sell_tokens: 0.0,
            slippage_bps: 300,
            buy_interval_secs: 0,
            flywheel_active: true,
            market_making_enabled: true,
            auto_claim_enabled: true,
            fee_threshold_sol: 0.01,
            reactive: ReactiveParams::default(),
            rebalance: RebalanceParams::default(),
            twap: TwapParams::default(),
            dynamic: DynamicParams::default(),
        }
    }

    /// Config invariants. Violations are a 4xx at the admin boundary and
    /// never reach the schedulers.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_buy_sol < 0.0 || self.max_buy_sol < 0.0 {
            return Err("buy bounds must be non-negative".into());
        }
        if self.min_buy_sol > self.max_buy_sol {
            return Err(format!(
                "min_buy_sol {} exceeds max_buy_sol {}",
                self.min_buy_sol, self.max_buy_sol
            ));
        }
        if self.slippage_bps == 0 || self.slippage_bps > 5000 {
            return Err(format!("slippage_bps {} out of range 1..=5000", self.slippage_bps));
        }
        if self.rebalance.target_sol_pct + self.rebalance.target_token_pct > 100.0 {
            return Err("allocation targets exceed 100%".into());
        }
        if self.rebalance.target_sol_pct < 0.0 || self.rebalance.target_token_pct < 0.0 {
            return Err("allocation targets must be non-negative".into());
        }
        if self.reactive.scale_pct < 0.0 || self.reactive.max_response_pct < 0.0 {
            return Err("reactive percentages must be non-negative".into());
        }
        if self.twap.slices == 0 {
            return Err("twap slices must be at least 1".into());
        }
        Ok(())
    }
}
