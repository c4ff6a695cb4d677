mod configs;
mod history;
mod launches;
mod nonces;
mod states;
mod tokens;

#[cfg(test)]
pub(crate) mod test_fixtures;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

/// Persistence layer. Exclusively owns every durable record; other
/// components hold only ids and addresses.
///
/// A single connection behind an async mutex — writes are per-row and
/// short-lived, and the schedulers already serialize their own ticks, so
/// one writer is plenty.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;

        Ok(Store { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Store { conn: Arc::new(Mutex::new(conn)) })
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// `curvewheel migrate` entry point.
pub fn migrate_cmd(data_dir: &Path) -> Result<()> {
    let db_path = data_dir.join("curvewheel.db");
    Store::open(&db_path)?;
    println!("schema up to date at {}", db_path.display());
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS wallets (
            address     TEXT PRIMARY KEY,
            kind        TEXT NOT NULL,
            custody_id  TEXT NOT NULL,
            created_at  INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id                     TEXT PRIMARY KEY,
            mint                   TEXT UNIQUE NOT NULL,
            name                   TEXT NOT NULL,
            symbol                 TEXT NOT NULL,
            decimals               INTEGER NOT NULL,
            image                  TEXT,
            source                 TEXT NOT NULL,
            owner_id               TEXT NOT NULL,
            dev_wallet             TEXT NOT NULL REFERENCES wallets(address),
            ops_wallet             TEXT NOT NULL REFERENCES wallets(address),
            is_active              INTEGER NOT NULL DEFAULT 1,
            is_suspended           INTEGER NOT NULL DEFAULT 0,
            suspend_reason         TEXT,
            is_verified            INTEGER NOT NULL DEFAULT 0,
            daily_trade_limit_sol  REAL,
            max_position_size_sol  REAL,
            risk_level             TEXT,
            created_at             INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS token_configs (
            token_id               TEXT PRIMARY KEY REFERENCES tokens(id) ON DELETE CASCADE,
            algorithm              TEXT NOT NULL,
            min_buy_sol            REAL NOT NULL,
            max_buy_sol            REAL NOT NULL,
            max_sell_tokens        REAL NOT NULL,
            slippage_bps           INTEGER NOT NULL,
            buy_interval_secs      INTEGER NOT NULL,
            flywheel_active        INTEGER NOT NULL,
            market_making_enabled  INTEGER NOT NULL,
            auto_claim_enabled     INTEGER NOT NULL,
            fee_threshold_sol      REAL NOT NULL,
            reactive_json          TEXT NOT NULL,
            rebalance_json         TEXT NOT NULL,
            twap_json              TEXT NOT NULL,
            dynamic_json           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS flywheel_states (
            token_id              TEXT PRIMARY KEY REFERENCES tokens(id) ON DELETE CASCADE,
            phase                 TEXT NOT NULL,
            buy_count             INTEGER NOT NULL,
            sell_count            INTEGER NOT NULL,
            sell_snapshot_tokens  REAL NOT NULL,
            sell_amount_per_tx    REAL NOT NULL,
            last_trade_at         INTEGER,
            last_checked_at       INTEGER,
            last_check_result     TEXT,
            consecutive_failures  INTEGER NOT NULL DEFAULT 0,
            paused_until          INTEGER,
            reserve_sol           REAL NOT NULL DEFAULT 0,
            last_condition        TEXT
        );

        CREATE TABLE IF NOT EXISTS pending_launches (
            id               TEXT PRIMARY KEY,
            owner_id         TEXT NOT NULL,
            name             TEXT NOT NULL,
            symbol           TEXT NOT NULL,
            image            TEXT,
            description      TEXT,
            deposit_address  TEXT NOT NULL,
            ops_address      TEXT NOT NULL,
            min_deposit_sol  REAL NOT NULL,
            status           TEXT NOT NULL,
            retry_count      INTEGER NOT NULL DEFAULT 0,
            expires_at       INTEGER NOT NULL,
            last_error       TEXT,
            created_at       INTEGER DEFAULT (unixepoch()),
            updated_at       INTEGER DEFAULT (unixepoch())
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_one_awaiting_per_address
            ON pending_launches(deposit_address) WHERE status = 'awaiting_deposit';

        CREATE TABLE IF NOT EXISTS transactions (
            id          TEXT PRIMARY KEY,
            token_id    TEXT NOT NULL,
            kind        TEXT NOT NULL,
            amount      REAL NOT NULL,
            signature   TEXT,
            status      TEXT NOT NULL,
            detail      TEXT,
            created_at  INTEGER DEFAULT (unixepoch())
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_token ON transactions(token_id, created_at);

        CREATE TABLE IF NOT EXISTS claims (
            id                TEXT PRIMARY KEY,
            token_id          TEXT NOT NULL,
            total_sol         REAL NOT NULL,
            platform_fee_sol  REAL NOT NULL,
            user_share_sol    REAL NOT NULL,
            signature         TEXT,
            started_at        INTEGER NOT NULL,
            completed_at      INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_claims_token ON claims(token_id, started_at);

        CREATE TABLE IF NOT EXISTS audit_log (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL,
            token_id    TEXT,
            detail      TEXT NOT NULL,
            created_at  INTEGER DEFAULT (unixepoch())
        );

        CREATE TABLE IF NOT EXISTS balance_snapshots (
            token_id       TEXT PRIMARY KEY REFERENCES tokens(id) ON DELETE CASCADE,
            dev_sol        REAL NOT NULL,
            ops_sol        REAL NOT NULL,
            dev_tokens     REAL NOT NULL,
            ops_tokens     REAL NOT NULL,
            claimable_sol  REAL NOT NULL,
            sol_price_usd  REAL,
            updated_at     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS platform_state (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            state_json  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admin_nonces (
            nonce       TEXT PRIMARY KEY,
            config_hash TEXT NOT NULL,
            issued_at   INTEGER NOT NULL,
            used        INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}

pub(crate) fn ts_to_datetime(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

pub(crate) fn opt_ts(ts: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
    ts.map(ts_to_datetime)
}
