use anyhow::{Context, Result, bail};
use rusqlite::{Row, Transaction};

use crate::model::TokenConfig;
use crate::model::token_config::{Algorithm, DynamicParams, ReactiveParams, RebalanceParams, TwapParams};

use super::Store;

pub(super) const CONFIG_COLS_PREFIXED: &str = "c.token_id AS cfg_token_id, c.algorithm, c.min_buy_sol, c.max_buy_sol, \
     c.max_sell_tokens, c.slippage_bps, c.buy_interval_secs, c.flywheel_active, \
     c.market_making_enabled, c.auto_claim_enabled, c.fee_threshold_sol, \
     c.reactive_json, c.rebalance_json, c.twap_json, c.dynamic_json";

pub(super) fn config_from_row(row: &Row) -> rusqlite::Result<TokenConfig> {
    let algorithm: String = row.get("algorithm")?;
    let reactive: String = row.get("reactive_json")?;
    let rebalance: String = row.get("rebalance_json")?;
    let twap: String = row.get("twap_json")?;
    let dynamic: String = row.get("dynamic_json")?;
    Ok(TokenConfig {
        token_id: row.get("cfg_token_id")?,
        algorithm: Algorithm::parse(&algorithm).unwrap_or(Algorithm::Simple),
        min_buy_sol: row.get("min_buy_sol")?,
        max_buy_sol: row.get("max_buy_sol")?,
        max_sell_tokens: row.get("max_sell_tokens")?,
        slippage_bps: row.get::<_, i64>("slippage_bps")? as u16,
        buy_interval_secs: row.get::<_, i64>("buy_interval_secs")? as u64,
        flywheel_active: row.get::<_, i64>("flywheel_active")? != 0,
        market_making_enabled: row.get::<_, i64>("market_making_enabled")? != 0,
        auto_claim_enabled: row.get::<_, i64>("auto_claim_enabled")? != 0,
        fee_threshold_sol: row.get("fee_threshold_sol")?,
        reactive: serde_json::from_str(&reactive).unwrap_or_else(|_| ReactiveParams::default()),
        rebalance: serde_json::from_str(&rebalance).unwrap_or_else(|_| RebalanceParams::default()),
        twap: serde_json::from_str(&twap).unwrap_or_else(|_| TwapParams::default()),
        dynamic: serde_json::from_str(&dynamic).unwrap_or_else(|_| DynamicParams::default()),
    })
}

pub(super) fn insert_config_tx(tx: &Transaction, config: &TokenConfig) -> Result<()> {
    tx.execute(
        "INSERT INTO token_configs (token_id, algorithm, min_buy_sol, max_buy_sol,
            max_sell_tokens, slippage_bps, buy_interval_secs, flywheel_active,
            market_making_enabled, auto_claim_enabled, fee_threshold_sol,
            reactive_json, rebalance_json, twap_json, dynamic_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        config_params(config)?,
    )
    .context("inserting token config")?;
    Ok(())
}

type ConfigParams = (
    String, &'static str, f64, f64, f64, i64, i64, i64, i64, i64, f64,
    String, String, String, String,
);

fn config_params(config: &TokenConfig) -> Result<ConfigParams> {
    Ok((
        config.token_id.clone(),
        config.algorithm.as_str(),
        config.min_buy_sol,
        config.max_buy_sol,
        config.max_sell_tokens,
        config.slippage_bps as i64,
        config.buy_interval_secs as i64,
        config.flywheel_active as i64,
        config.market_making_enabled as i64,
        config.auto_claim_enabled as i64,
        config.fee_threshold_sol,
        serde_json::to_string(&config.reactive)?,
        serde_json::to_string(&config.rebalance)?,
        serde_json::to_string(&config.twap)?,
        serde_json::to_string(&config.dynamic)?,
    ))
}

impl Store {
    pub async fn get_config(&self, token_id: &str) -> Result<Option<TokenConfig>> {
        let conn = self.lock().await;
        let sql = format!(
            "SELECT {CONFIG_COLS_PREFIXED} FROM token_configs c WHERE c.token_id = ?1"
        );
        let config = conn.query_row(&sql, [token_id], config_from_row).ok();
        Ok(config)
    }

    /// Replace a token's config wholesale. The caller validates first; the
    /// store re-checks as a backstop.
    pub async fn update_config(&self, config: &TokenConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            bail!("config invariant violated: {e}");
        }
        let conn = self.lock().await;
        let n = conn.execute(
            "UPDATE token_configs SET algorithm = ?2, min_buy_sol = ?3, max_buy_sol = ?4,
                max_sell_tokens = ?5, slippage_bps = ?6, buy_interval_secs = ?7,
                flywheel_active = ?8, market_making_enabled = ?9, auto_claim_enabled = ?10,
                fee_threshold_sol = ?11, reactive_json = ?12, rebalance_json = ?13,
                twap_json = ?14, dynamic_json = ?15
             WHERE token_id = ?1",
            config_params(config)?,
        )?;
        if n == 0 {
            bail!("config for token {} not found", config.token_id);
        }
        Ok(())
    }
}
