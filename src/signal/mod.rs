mod indicators;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use tokio::sync::Mutex;
use tracing::debug;

use crate::amm::Amm;
use crate::config::SOL_MINT;

pub use indicators::{rsi, sma, volatility};

/// Samples retained per token. At the flywheel cadence this spans roughly
/// the last trading session; indicators treat it as their full lookback.
const WINDOW: usize = 48;
const RSI_PERIOD: usize = 14;
const SMA_FAST: usize = 8;
const SMA_SLOW: usize = 24;
const MIN_SAMPLES: usize = 8;
const HIGH_VOLATILITY: f64 = 0.05;
const PRICE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct CurrentPrice {
    /// SOL per whole token.
    pub price_sol: f64,
    /// Percent change across the retained window (24 h proxy).
    pub change_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone)]
pub struct MarketSignals {
    pub direction: TrendDirection,
    /// Fast/slow SMA divergence as a fraction of the slow SMA.
    pub strength: f64,
    pub rsi: f64,
    pub volatility: f64,
    pub volatility_is_high: bool,
    pub change_pct: f64,
    /// Suggested trade size as a percentage of the ops SOL balance.
    pub suggested_position_size_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    StrongBuy,
    Hold,
    Sell,
    StrongSell,
}

impl SignalAction {
    pub fn is_buy(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::StrongBuy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, SignalAction::Sell | SignalAction::StrongSell)
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, SignalAction::StrongBuy | SignalAction::StrongSell)
    }
}

#[derive(Debug, Clone)]
pub struct OptimalSignal {
    pub action: SignalAction,
    /// 0–100.
    pub confidence: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct PricePoint {
    price_sol: f64,
    at: DateTime<Utc>,
}

struct TokenHistory {
    points: VecDeque<PricePoint>,
    last_sampled: Option<tokio::time::Instant>,
}

impl TokenHistory {
    fn new() -> Self {
        TokenHistory { points: VecDeque::with_capacity(WINDOW), last_sampled: None }
    }

    fn push(&mut self, point: PricePoint) {
        // Age out day-old samples so a token idle overnight starts fresh.
        let cutoff = point.at - chrono::Duration::hours(24);
        while self.points.front().is_some_and(|p| p.at < cutoff) {
            self.points.pop_front();
        }
        if self.points.len() == WINDOW {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price_sol).collect()
    }
}

/// Per-token price history and indicator oracle. The scheduler treats the
/// outputs as opaque; all thresholds live here.
pub struct SignalEngine {
    amm: Arc<dyn Amm>,
    histories: Mutex<HashMap<String, TokenHistory>>,
}

impl SignalEngine {
    pub fn new(amm: Arc<dyn Amm>) -> Self {
        SignalEngine { amm, histories: Mutex::new(HashMap::new()) }
    }

    /// Current price, sampling the AMM when the cached point is older than
    /// the TTL. Returns None while the venue has no route.
    pub async fn fetch_current(&self, mint: &str, decimals: u8) -> Option<CurrentPrice> {
        self.ensure_sampled(mint, decimals).await;

        let histories = self.histories.lock().await;
        let history = histories.get(mint)?;
        let latest = history.points.back()?;
        let oldest = history.points.front()?;
        let change_pct = if oldest.price_sol > 0.0 {
            (latest.price_sol - oldest.price_sol) / oldest.price_sol * 100.0
        } else {
            0.0
        };
        Some(CurrentPrice { price_sol: latest.price_sol, change_pct })
    }

    /// Trend/volatility snapshot, or None until enough samples exist.
    pub async fn signals(&self, mint: &str, decimals: u8) -> Option<MarketSignals> {
        self.ensure_sampled(mint, decimals).await;

        let histories = self.histories.lock().await;
        let history = histories.get(mint)?;
        let prices = history.prices();
        if prices.len() < MIN_SAMPLES {
            return None;
        }

        let rsi_value = rsi(&prices, RSI_PERIOD);
        let fast = sma(&prices, SMA_FAST.min(prices.len()));
        let slow = sma(&prices, SMA_SLOW.min(prices.len()));
        let strength = if slow > 0.0 { (fast - slow).abs() / slow } else { 0.0 };
        let direction = if strength < 0.002 {
            TrendDirection::Flat
        } else if fast > slow {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };

        let vol = volatility(&prices);
        let first = prices.first().copied().unwrap_or(0.0);
        let last = prices.last().copied().unwrap_or(0.0);
        let change_pct = if first > 0.0 { (last - first) / first * 100.0 } else { 0.0 };

        let suggested = suggested_position_size_pct(vol, strength);

        Some(MarketSignals {
            direction,
            strength,
            rsi: rsi_value,
            volatility: vol,
            volatility_is_high: vol > HIGH_VOLATILITY,
            change_pct,
            suggested_position_size_pct: suggested,
        })
    }

    /// Combined buy/sell/hold suggestion with confidence.
    pub async fn optimal_signal(&self, mint: &str, decimals: u8) -> Option<OptimalSignal> {
        let signals = self.signals(mint, decimals).await?;
        Some(evaluate(&signals))
    }

    /// Append an externally observed price point; also used by tests to
    /// seed deterministic histories.
    pub async fn record_price(&self, mint: &str, price_sol: f64) {
        let mut histories = self.histories.lock().await;
        histories
            .entry(mint.to_string())
            .or_insert_with(TokenHistory::new)
            .push(PricePoint { price_sol, at: Utc::now() });
    }

    async fn ensure_sampled(&self, mint: &str, decimals: u8) {
        {
            let histories = self.histories.lock().await;
            if let Some(history) = histories.get(mint)
                && history.last_sampled.is_some_and(|t| t.elapsed() < PRICE_TTL)
            {
                return;
            }
        }

        // Reference quote: 1 SOL into the token. Price per token follows
        // from the out amount.
        let quote = match self
            .amm
            .quote(SOL_MINT, mint, LAMPORTS_PER_SOL, 100)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                debug!(mint, "price sample unavailable: {e}");
                return;
            }
        };
        let tokens_out = quote.out_amount as f64 / 10f64.powi(decimals as i32);
        if tokens_out <= 0.0 {
            return;
        }
        let price_sol = 1.0 / tokens_out;

        let mut histories = self.histories.lock().await;
        let history = histories.entry(mint.to_string()).or_insert_with(TokenHistory::new);
        history.push(PricePoint { price_sol, at: Utc::now() });
        history.last_sampled = Some(tokio::time::Instant::now());
    }
}

fn suggested_position_size_pct(vol: f64, strength: f64) -> f64 {
    let base = 10.0;
    let vol_damping = if vol > HIGH_VOLATILITY { 0.5 } else { 1.0 };
    let trend_boost = 1.0 + (strength * 10.0).min(1.5);
    (base * vol_damping * trend_boost).clamp(5.0, 25.0)
}

/// Vote-based decision: RSI extremes, trend direction, and mean-reversion
/// on outsized moves. Confidence is 40 plus 20 per net vote.
fn evaluate(signals: &MarketSignals) -> OptimalSignal {
    let mut buy_votes = 0i32;
    let mut sell_votes = 0i32;
    let mut reasons = Vec::new();

    if signals.rsi < 20.0 {
        buy_votes += 2;
        reasons.push(format!("rsi deeply oversold ({:.1})", signals.rsi));
    } else if signals.rsi < 30.0 {
        buy_votes += 1;
        reasons.push(format!("rsi oversold ({:.1})", signals.rsi));
    } else if signals.rsi > 80.0 {
        sell_votes += 2;
        reasons.push(format!("rsi deeply overbought ({:.1})", signals.rsi));
    } else if signals.rsi > 70.0 {
        sell_votes += 1;
        reasons.push(format!("rsi overbought ({:.1})", signals.rsi));
    }

    match signals.direction {
        TrendDirection::Up => {
            buy_votes += 1;
            reasons.push("uptrend".into());
        }
        TrendDirection::Down => {
            sell_votes += 1;
            reasons.push("downtrend".into());
        }
        TrendDirection::Flat => {}
    }

    if signals.change_pct <= -10.0 {
        buy_votes += 1;
        reasons.push(format!("drawdown {:.1}%", signals.change_pct));
    } else if signals.change_pct >= 10.0 {
        sell_votes += 1;
        reasons.push(format!("runup {:.1}%", signals.change_pct));
    }

    let net = buy_votes - sell_votes;
    let confidence = (40.0 + 20.0 * net.abs() as f64).clamp(0.0, 100.0);

    let action = match net {
        n if n >= 3 => SignalAction::StrongBuy,
        1 | 2 => SignalAction::Buy,
        0 => SignalAction::Hold,
        -1 | -2 => SignalAction::Sell,
        _ => SignalAction::StrongSell,
    };

    if reasons.is_empty() {
        reasons.push("no directional signal".into());
    }

    OptimalSignal { action, confidence, reasons }
}
