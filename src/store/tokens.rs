use anyhow::{Context, Result, bail};
use rusqlite::{Row, params};

use crate::model::{Token, TokenConfig, TokenSource, Wallet, WalletKind};

use super::{Store, ts_to_datetime};

fn token_from_row(row: &Row) -> rusqlite::Result<Token> {
    let source: String = row.get("source")?;
    Ok(Token {
        id: row.get("id")?,
        mint: row.get("mint")?,
        name: row.get("name")?,
        symbol: row.get("symbol")?,
        decimals: row.get::<_, i64>("decimals")? as u8,
        image: row.get("image")?,
        source: TokenSource::parse(&source).unwrap_or(TokenSource::Registered),
        owner_id: row.get("owner_id")?,
        dev_wallet: row.get("dev_wallet")?,
        ops_wallet: row.get("ops_wallet")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        is_suspended: row.get::<_, i64>("is_suspended")? != 0,
        suspend_reason: row.get("suspend_reason")?,
        is_verified: row.get::<_, i64>("is_verified")? != 0,
        daily_trade_limit_sol: row.get("daily_trade_limit_sol")?,
        max_position_size_sol: row.get("max_position_size_sol")?,
        risk_level: row.get("risk_level")?,
        created_at: ts_to_datetime(row.get("created_at")?),
    })
}

const TOKEN_COLS: &str = "id, mint, name, symbol, decimals, image, source, owner_id, \
     dev_wallet, ops_wallet, is_active, is_suspended, suspend_reason, is_verified, \
     daily_trade_limit_sol, max_position_size_sol, risk_level, created_at";

impl Store {
    pub async fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO wallets (address, kind, custody_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                wallet.address,
                wallet.kind.as_str(),
                wallet.custody_id,
                wallet.created_at.timestamp()
            ],
        )
        .context("inserting wallet")?;
        Ok(())
    }

    /// Insert a wallet if the address is new; existing rows are left
    /// untouched.
    pub async fn ensure_wallet(&self, wallet: &Wallet) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO wallets (address, kind, custody_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                wallet.address,
                wallet.kind.as_str(),
                wallet.custody_id,
                wallet.created_at.timestamp()
            ],
        )?;
        Ok(())
    }

    pub async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>> {
        let conn = self.lock().await;
        let wallet = conn
            .query_row(
                "SELECT address, kind, custody_id, created_at FROM wallets WHERE address = ?1",
                [address],
                |row| {
                    let kind: String = row.get("kind")?;
                    Ok(Wallet {
                        address: row.get("address")?,
                        kind: WalletKind::parse(&kind).unwrap_or(WalletKind::Ops),
                        custody_id: row.get("custody_id")?,
                        created_at: ts_to_datetime(row.get("created_at")?),
                    })
                },
            )
            .ok();
        Ok(wallet)
    }

    /// Create a token with its config and initial flywheel state in a
    /// single transaction. Wallet rows must already exist (inserted at
    /// provisioning time).
    pub async fn insert_token(&self, token: &Token, config: &TokenConfig) -> Result<()> {
        if let Err(e) = token.validate() {
            bail!("token invariant violated: {e}");
        }
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tokens (id, mint, name, symbol, decimals, image, source, owner_id,
                dev_wallet, ops_wallet, is_active, is_suspended, suspend_reason, is_verified,
                daily_trade_limit_sol, max_position_size_sol, risk_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                token.id,
                token.mint,
                token.name,
                token.symbol,
                token.decimals as i64,
                token.image,
                token.source.as_str(),
                token.owner_id,
                token.dev_wallet,
                token.ops_wallet,
                token.is_active as i64,
                token.is_suspended as i64,
                token.suspend_reason,
                token.is_verified as i64,
                token.daily_trade_limit_sol,
                token.max_position_size_sol,
                token.risk_level,
                token.created_at.timestamp(),
            ],
        )
        .context("inserting token")?;
        super::configs::insert_config_tx(&tx, config)?;
        tx.execute(
            "INSERT INTO flywheel_states (token_id, phase, buy_count, sell_count,
                sell_snapshot_tokens, sell_amount_per_tx) VALUES (?1, 'buy', 0, 0, 0, 0)",
            [&token.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub async fn get_token(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.lock().await;
        let token = conn
            .query_row(
                &format!("SELECT {TOKEN_COLS} FROM tokens WHERE id = ?1"),
                [id],
                token_from_row,
            )
            .ok();
        Ok(token)
    }

    pub async fn get_token_by_mint(&self, mint: &str) -> Result<Option<Token>> {
        let conn = self.lock().await;
        let token = conn
            .query_row(
                &format!("SELECT {TOKEN_COLS} FROM tokens WHERE mint = ?1"),
                [mint],
                token_from_row,
            )
            .ok();
        Ok(token)
    }

    /// Tokens the flywheel scheduler should process this tick:
    /// active, not suspended, flywheel on.
    pub async fn flywheel_eligible(&self) -> Result<Vec<(Token, TokenConfig)>> {
        self.eligible_where("c.flywheel_active = 1").await
    }

    /// Tokens the claim schedulers should consider.
    pub async fn autoclaim_eligible(&self) -> Result<Vec<(Token, TokenConfig)>> {
        self.eligible_where("c.auto_claim_enabled = 1").await
    }

    /// Tokens the reactive engine watches: reactive algorithm with
    /// reactive mode enabled.
    pub async fn reactive_eligible(&self) -> Result<Vec<(Token, TokenConfig)>> {
        self.eligible_where(
            "c.flywheel_active = 1 AND c.algorithm = 'transaction_reactive'
             AND json_extract(c.reactive_json, '$.enabled') = 1",
        )
        .await
    }

    async fn eligible_where(&self, extra: &str) -> Result<Vec<(Token, TokenConfig)>> {
        let conn = self.lock().await;
        let sql = format!(
            "SELECT {cols}, {cfg} FROM tokens t
             JOIN token_configs c ON c.token_id = t.id
             WHERE t.is_active = 1 AND t.is_suspended = 0 AND {extra}
             ORDER BY t.created_at",
            cols = TOKEN_COLS
                .split(", ")
                .map(|c| format!("t.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
            cfg = super::configs::CONFIG_COLS_PREFIXED,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((token_from_row(row)?, super::configs::config_from_row(row)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn set_token_active(&self, id: &str, active: bool) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "UPDATE tokens SET is_active = ?2 WHERE id = ?1",
            params![id, active as i64],
        )?;
        Ok(())
    }

    /// Suspend a token and force all automation off in the same logical
    /// update. Idempotent: re-suspending only refreshes the reason.
    pub async fn suspend_token(&self, id: &str, reason: &str) -> Result<()> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE tokens SET is_suspended = 1, suspend_reason = ?2 WHERE id = ?1",
            params![id, reason],
        )?;
        tx.execute(
            "UPDATE token_configs SET flywheel_active = 0, market_making_enabled = 0,
                auto_claim_enabled = 0 WHERE token_id = ?1",
            [id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Clear suspension. Automation flags stay off; owners re-enable
    /// explicitly.
    pub async fn unsuspend_token(&self, id: &str) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "UPDATE tokens SET is_suspended = 0, suspend_reason = NULL WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Suspend every non-platform token that is not already suspended.
    /// Returns the number of tokens touched.
    pub async fn bulk_suspend(&self, reason: &str) -> Result<usize> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM tokens WHERE source != 'platform' AND is_suspended = 0",
            )?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for id in &ids {
            tx.execute(
                "UPDATE tokens SET is_suspended = 1, suspend_reason = ?2 WHERE id = ?1",
                params![id, reason],
            )?;
            tx.execute(
                "UPDATE token_configs SET flywheel_active = 0, market_making_enabled = 0,
                    auto_claim_enabled = 0 WHERE token_id = ?1",
                [id],
            )?;
        }
        tx.commit()?;
        Ok(ids.len())
    }

    pub async fn update_limits(
        &self,
        id: &str,
        daily_trade_limit_sol: Option<f64>,
        max_position_size_sol: Option<f64>,
        risk_level: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock().await;
        let n = conn.execute(
            "UPDATE tokens SET daily_trade_limit_sol = ?2, max_position_size_sol = ?3,
                risk_level = ?4 WHERE id = ?1",
            params![id, daily_trade_limit_sol, max_position_size_sol, risk_level],
        )?;
        if n == 0 {
            bail!("token {id} not found");
        }
        Ok(())
    }

    /// Counts backing the admin stats endpoint.
    pub async fn platform_stats(&self) -> Result<serde_json::Value> {
        let conn = self.lock().await;
        let mut by_source = serde_json::Map::new();
        {
            let mut stmt =
                conn.prepare("SELECT source, count(*) FROM tokens GROUP BY source")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (source, n) = row?;
                by_source.insert(source, n.into());
            }
        }
        let day_ago = chrono::Utc::now().timestamp() - 86_400;
        let trades_24h: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE kind IN ('buy','sell') AND created_at >= ?1",
            [day_ago],
            |row| row.get(0),
        )?;
        let claims_24h: i64 = conn.query_row(
            "SELECT count(*) FROM claims WHERE started_at >= ?1",
            [day_ago],
            |row| row.get(0),
        )?;
        let suspended: i64 =
            conn.query_row("SELECT count(*) FROM tokens WHERE is_suspended = 1", [], |row| {
                row.get(0)
            })?;
        Ok(serde_json::json!({
            "tokens_by_source": by_source,
            "suspended": suspended,
            "trades_24h": trades_24h,
            "claims_24h": claims_24h,
        }))
    }
}
