use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use super::Store;

/// Admin-auth nonce bookkeeping. A nonce is issued with the hash of the
/// change it authorizes, then burned on first use.
impl Store {
    pub async fn insert_nonce(
        &self,
        nonce: &str,
        config_hash: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO admin_nonces (nonce, config_hash, issued_at, used) VALUES (?1, ?2, ?3, 0)",
            params![nonce, config_hash, issued_at.timestamp()],
        )?;
        Ok(())
    }

    /// Atomically consume a nonce. Returns the hash it was issued for, or
    /// None if unknown or already used (replay).
    pub async fn consume_nonce(&self, nonce: &str) -> Result<Option<(String, DateTime<Utc>)>> {
        let mut conn = self.lock().await;
        let tx = conn.transaction()?;
        let row: Option<(String, i64)> = tx
            .query_row(
                "SELECT config_hash, issued_at FROM admin_nonces WHERE nonce = ?1 AND used = 0",
                [nonce],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        let result = match row {
            Some((hash, issued)) => {
                tx.execute("UPDATE admin_nonces SET used = 1 WHERE nonce = ?1", [nonce])?;
                Some((hash, super::ts_to_datetime(issued)))
            }
            None => None,
        };
        tx.commit()?;
        Ok(result)
    }

    /// Drop nonces older than the recency window; called opportunistically
    /// from the issue path.
    pub async fn prune_nonces(&self, cutoff: DateTime<Utc>) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "DELETE FROM admin_nonces WHERE issued_at < ?1",
            [cutoff.timestamp()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nonce_single_use() {
        let store = Store::in_memory().unwrap();
        let now = Utc::now();
        store.insert_nonce("n1", "hash1", now).await.unwrap();

        let first = store.consume_nonce("n1").await.unwrap();
        assert_eq!(first.unwrap().0, "hash1");
        // replay is rejected
        assert!(store.consume_nonce("n1").await.unwrap().is_none());
        // unknown nonce
        assert!(store.consume_nonce("n2").await.unwrap().is_none());
    }
}
