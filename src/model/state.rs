use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePhase {
    Buy,
    Sell,
}

impl TradePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradePhase::Buy => "buy",
            TradePhase::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(TradePhase::Buy),
            "sell" => Some(TradePhase::Sell),
            _ => None,
        }
    }
}

/// Market classification used by the dynamic algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Pump,
    Dump,
    Ranging,
    Normal,
    ExtremeVolatility,
}

impl MarketCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCondition::Pump => "pump",
            MarketCondition::Dump => "dump",
            MarketCondition::Ranging => "ranging",
            MarketCondition::Normal => "normal",
            MarketCondition::ExtremeVolatility => "extreme_volatility",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pump" => Some(MarketCondition::Pump),
            "dump" => Some(MarketCondition::Dump),
            "ranging" => Some(MarketCondition::Ranging),
            "normal" => Some(MarketCondition::Normal),
            "extreme_volatility" => Some(MarketCondition::ExtremeVolatility),
            _ => None,
        }
    }

    /// Adverse conditions park capital in reserve; leaving them deploys it.
    pub fn is_adverse(&self) -> bool {
        matches!(self, MarketCondition::Dump | MarketCondition::ExtremeVolatility)
    }
}

/// Per-token flywheel position. Mutated only by the flywheel scheduler and
/// the reactive engine, always through read-modify-write on this row.
///
/// Invariant: in the buy phase `buy_count < cycle_len` and `sell_count` is
/// zero; symmetric in the sell phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlywheelState {
    pub token_id: String,
    pub phase: TradePhase,
    pub buy_count: u32,
    pub sell_count: u32,
    /// Ops token balance captured when the sell phase began.
    pub sell_snapshot_tokens: f64,
    /// Snapshot divided by the sell cycle length.
    pub sell_amount_per_tx: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Outcome tag of the most recent tick: a signature-bearing trade, or
    /// one of `insufficient_sol`, `balanced`, `high_volatility`, ...
    pub last_check_result: Option<String>,
    pub consecutive_failures: u32,
    pub paused_until: Option<DateTime<Utc>>,
    /// Dynamic algorithm: SOL parked for favorable-transition deployment.
    pub reserve_sol: f64,
    /// Dynamic algorithm: the condition observed on the previous tick.
    pub last_condition: Option<MarketCondition>,
}

impl FlywheelState {
    pub fn initial(token_id: &str) -> Self {
        FlywheelState {
            token_id: token_id.to_string(),
            phase: TradePhase::Buy,
            buy_count: 0,
            sell_count: 0,
            sell_snapshot_tokens: 0.0,
            sell_amount_per_tx: 0.0,
            last_trade_at: None,
            last_checked_at: None,
            last_check_result: None,
            consecutive_failures: 0,
            paused_until: None,
            reserve_sol: 0.0,
            last_condition: None,
        }
    }

    /// Record a completed buy; rotate into the sell phase when the cycle
    /// fills, snapshotting the ops token balance for even sell sizing.
    pub fn apply_buy(&mut self, cycle_len: u32, ops_token_balance: f64, now: DateTime<Utc>) {
        self.buy_count += 1;
        self.last_trade_at = Some(now);
        self.consecutive_failures = 0;
        if self.buy_count >= cycle_len {
            self.phase = TradePhase::Sell;
            self.buy_count = 0;
            self.sell_count = 0;
            self.sell_snapshot_tokens = ops_token_balance;
            self.sell_amount_per_tx = if cycle_len > 0 {
                ops_token_balance / cycle_len as f64
            } else {
                0.0
            };
        }
    }

    /// Record a completed sell; rotate back to buying when the cycle fills.
    pub fn apply_sell(&mut self, cycle_len: u32, now: DateTime<Utc>) {
        self.sell_count += 1;
        self.last_trade_at = Some(now);
        self.consecutive_failures = 0;
        if self.sell_count >= cycle_len {
            self.reset_to_buy();
        }
    }

    /// Abandon the sell phase (dust or zero balance) and start buying again.
    pub fn reset_to_buy(&mut self) {
        self.phase = TradePhase::Buy;
        self.buy_count = 0;
        self.sell_count = 0;
        self.sell_snapshot_tokens = 0.0;
        self.sell_amount_per_tx = 0.0;
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|t| now < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_rotation() {
        let mut s = FlywheelState::initial("t1");
        let now = Utc::now();
        for i in 1..5 {
            s.apply_buy(5, 1000.0, now);
            assert_eq!(s.phase, TradePhase::Buy);
            assert_eq!(s.buy_count, i);
            assert_eq!(s.sell_count, 0);
        }
        s.apply_buy(5, 1000.0, now);
        assert_eq!(s.phase, TradePhase::Sell);
        assert_eq!(s.buy_count, 0);
        assert_eq!(s.sell_snapshot_tokens, 1000.0);
        assert_eq!(s.sell_amount_per_tx, 200.0);
    }

    #[test]
    fn sell_rotation_resets() {
        let mut s = FlywheelState::initial("t1");
        let now = Utc::now();
        for _ in 0..5 {
            s.apply_buy(5, 500.0, now);
        }
        for i in 1..5 {
            s.apply_sell(5, now);
            assert_eq!(s.phase, TradePhase::Sell);
            assert_eq!(s.sell_count, i);
        }
        s.apply_sell(5, now);
        assert_eq!(s.phase, TradePhase::Buy);
        assert_eq!(s.buy_count, 0);
        assert_eq!(s.sell_count, 0);
        assert_eq!(s.sell_amount_per_tx, 0.0);
    }

    #[test]
    fn pause_window() {
        let mut s = FlywheelState::initial("t1");
        let now = Utc::now();
        assert!(!s.is_paused(now));
        s.paused_until = Some(now + chrono::Duration::seconds(30));
        assert!(s.is_paused(now));
        assert!(!s.is_paused(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn condition_adversity() {
        assert!(MarketCondition::Dump.is_adverse());
        assert!(MarketCondition::ExtremeVolatility.is_adverse());
        assert!(!MarketCondition::Pump.is_adverse());
        assert!(!MarketCondition::Normal.is_adverse());
        assert!(!MarketCondition::Ranging.is_adverse());
    }
}
