use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};

use crate::model::{LaunchStatus, PendingLaunch};

use super::{Store, ts_to_datetime};

fn launch_from_row(row: &Row) -> rusqlite::Result<PendingLaunch> {
    let status: String = row.get("status")?;
    Ok(PendingLaunch {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        name: row.get("name")?,
        symbol: row.get("symbol")?,
        image: row.get("image")?,
        description: row.get("description")?,
        deposit_address: row.get("deposit_address")?,
        ops_address: row.get("ops_address")?,
        min_deposit_sol: row.get("min_deposit_sol")?,
        status: LaunchStatus::parse(&status).unwrap_or(LaunchStatus::Failed),
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        expires_at: ts_to_datetime(row.get("expires_at")?),
        last_error: row.get("last_error")?,
        created_at: ts_to_datetime(row.get("created_at")?),
        updated_at: ts_to_datetime(row.get("updated_at")?),
    })
}

impl Store {
    /// Insert a new launch. Fails if the deposit address already has an
    /// awaiting launch (partial unique index).
    pub async fn insert_launch(&self, launch: &PendingLaunch) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO pending_launches (id, owner_id, name, symbol, image, description,
                deposit_address, ops_address, min_deposit_sol, status, retry_count,
                expires_at, last_error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                launch.id,
                launch.owner_id,
                launch.name,
                launch.symbol,
                launch.image,
                launch.description,
                launch.deposit_address,
                launch.ops_address,
                launch.min_deposit_sol,
                launch.status.as_str(),
                launch.retry_count as i64,
                launch.expires_at.timestamp(),
                launch.last_error,
                launch.created_at.timestamp(),
                launch.updated_at.timestamp(),
            ],
        )
        .context("inserting pending launch")?;
        Ok(())
    }

    pub async fn get_launch(&self, id: &str) -> Result<Option<PendingLaunch>> {
        let conn = self.lock().await;
        let launch = conn
            .query_row("SELECT * FROM pending_launches WHERE id = ?1", [id], launch_from_row)
            .ok();
        Ok(launch)
    }

    /// Launches the deposit watcher should look at this tick: everything
    /// awaiting a deposit, plus retry_pending rows whose 30-second wait
    /// (measured from updated_at) has elapsed.
    pub async fn watchable_launches(&self, now: DateTime<Utc>) -> Result<Vec<PendingLaunch>> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM pending_launches
             WHERE status = 'awaiting_deposit'
                OR (status = 'retry_pending' AND updated_at <= ?1)
             ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([now.timestamp() - 30], launch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Optimistic status claim: `UPDATE … WHERE id = ? AND status = from`.
    /// Returns false when another worker already won the row.
    pub async fn cas_launch_status(
        &self,
        id: &str,
        from: LaunchStatus,
        to: LaunchStatus,
    ) -> Result<bool> {
        let conn = self.lock().await;
        let n = conn.execute(
            "UPDATE pending_launches SET status = ?3, updated_at = unixepoch()
             WHERE id = ?1 AND status = ?2",
            params![id, from.as_str(), to.as_str()],
        )?;
        Ok(n == 1)
    }

    pub async fn set_launch_status(
        &self,
        id: &str,
        status: LaunchStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "UPDATE pending_launches SET status = ?2, last_error = coalesce(?3, last_error),
                updated_at = unixepoch()
             WHERE id = ?1",
            params![id, status.as_str(), last_error],
        )?;
        Ok(())
    }

    /// Bump retry_count and return the new value.
    pub async fn increment_launch_retry(&self, id: &str) -> Result<u32> {
        let conn = self.lock().await;
        conn.execute(
            "UPDATE pending_launches SET retry_count = retry_count + 1, updated_at = unixepoch()
             WHERE id = ?1",
            [id],
        )?;
        let n: i64 = conn.query_row(
            "SELECT retry_count FROM pending_launches WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(n as u32)
    }
}
