use anyhow::{Context, Result};
use rusqlite::{Row, params};

use crate::model::{FlywheelState, MarketCondition, TradePhase};

use super::{Store, opt_ts};

fn state_from_row(row: &Row) -> rusqlite::Result<FlywheelState> {
    let phase: String = row.get("phase")?;
    let condition: Option<String> = row.get("last_condition")?;
    Ok(FlywheelState {
        token_id: row.get("token_id")?,
        phase: TradePhase::parse(&phase).unwrap_or(TradePhase::Buy),
        buy_count: row.get::<_, i64>("buy_count")? as u32,
        sell_count: row.get::<_, i64>("sell_count")? as u32,
        sell_snapshot_tokens: row.get("sell_snapshot_tokens")?,
        sell_amount_per_tx: row.get("sell_amount_per_tx")?,
        last_trade_at: opt_ts(row.get("last_trade_at")?),
        last_checked_at: opt_ts(row.get("last_checked_at")?),
        last_check_result: row.get("last_check_result")?,
        consecutive_failures: row.get::<_, i64>("consecutive_failures")? as u32,
        paused_until: opt_ts(row.get("paused_until")?),
        reserve_sol: row.get("reserve_sol")?,
        last_condition: condition.as_deref().and_then(MarketCondition::parse),
    })
}

impl Store {
    pub async fn get_state(&self, token_id: &str) -> Result<Option<FlywheelState>> {
        let conn = self.lock().await;
        let state = conn
            .query_row(
                "SELECT * FROM flywheel_states WHERE token_id = ?1",
                [token_id],
                state_from_row,
            )
            .ok();
        Ok(state)
    }

    /// Load a token's state, inserting the initial buy-phase row if the
    /// token has none yet.
    pub async fn get_or_init_state(&self, token_id: &str) -> Result<FlywheelState> {
        if let Some(state) = self.get_state(token_id).await? {
            return Ok(state);
        }
        let state = FlywheelState::initial(token_id);
        self.save_state(&state).await?;
        Ok(state)
    }

    pub async fn save_state(&self, state: &FlywheelState) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO flywheel_states (token_id, phase, buy_count, sell_count,
                sell_snapshot_tokens, sell_amount_per_tx, last_trade_at, last_checked_at,
                last_check_result, consecutive_failures, paused_until, reserve_sol,
                last_condition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(token_id) DO UPDATE SET
                phase = excluded.phase,
                buy_count = excluded.buy_count,
                sell_count = excluded.sell_count,
                sell_snapshot_tokens = excluded.sell_snapshot_tokens,
                sell_amount_per_tx = excluded.sell_amount_per_tx,
                last_trade_at = excluded.last_trade_at,
                last_checked_at = excluded.last_checked_at,
                last_check_result = excluded.last_check_result,
                consecutive_failures = excluded.consecutive_failures,
                paused_until = excluded.paused_until,
                reserve_sol = excluded.reserve_sol,
                last_condition = excluded.last_condition",
            params![
                state.token_id,
                state.phase.as_str(),
                state.buy_count as i64,
                state.sell_count as i64,
                state.sell_snapshot_tokens,
                state.sell_amount_per_tx,
                state.last_trade_at.map(|t| t.timestamp()),
                state.last_checked_at.map(|t| t.timestamp()),
                state.last_check_result,
                state.consecutive_failures as i64,
                state.paused_until.map(|t| t.timestamp()),
                state.reserve_sol,
                state.last_condition.map(|c| c.as_str()),
            ],
        )
        .context("saving flywheel state")?;
        Ok(())
    }

    /// The platform token loop's singleton state, kept apart from the
    /// tenant tables.
    pub async fn get_platform_state(&self) -> Result<Option<FlywheelState>> {
        let conn = self.lock().await;
        let json: Option<String> = conn
            .query_row("SELECT state_json FROM platform_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .ok();
        Ok(json.and_then(|j| serde_json::from_str(&j).ok()))
    }

    pub async fn save_platform_state(&self, state: &FlywheelState) -> Result<()> {
        let conn = self.lock().await;
        let json = serde_json::to_string(state)?;
        conn.execute(
            "INSERT INTO platform_state (id, state_json) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json",
            [json],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenSource;
    use crate::store::test_fixtures::seed_token;
    use chrono::Utc;

    #[tokio::test]
    async fn state_round_trip() {
        let store = Store::in_memory().unwrap();
        seed_token(&store, "t1", "Mint1", TokenSource::Launched).await;

        let mut state = store.get_or_init_state("t1").await.unwrap();
        assert_eq!(state.phase, TradePhase::Buy);
        assert_eq!(state.buy_count, 0);

        let now = Utc::now();
        for _ in 0..5 {
            state.apply_buy(5, 1234.0, now);
        }
        state.last_check_result = Some("buy".into());
        state.last_condition = Some(MarketCondition::Pump);
        state.reserve_sol = 0.5;
        store.save_state(&state).await.unwrap();

        let got = store.get_state("t1").await.unwrap().unwrap();
        assert_eq!(got.phase, TradePhase::Sell);
        assert_eq!(got.sell_amount_per_tx, 1234.0 / 5.0);
        assert_eq!(got.last_condition, Some(MarketCondition::Pump));
        assert_eq!(got.reserve_sol, 0.5);
        assert_eq!(got.last_trade_at.unwrap().timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn platform_state_singleton() {
        let store = Store::in_memory().unwrap();
        assert!(store.get_platform_state().await.unwrap().is_none());

        let mut state = FlywheelState::initial("platform");
        state.buy_count = 3;
        store.save_platform_state(&state).await.unwrap();
        state.buy_count = 4;
        store.save_platform_state(&state).await.unwrap();

        let got = store.get_platform_state().await.unwrap().unwrap();
        assert_eq!(got.buy_count, 4);
    }
}
