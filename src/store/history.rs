use anyhow::{Context, Result};
use rusqlite::params;

use crate::model::{AuditEvent, BalanceSnapshot, ClaimRecord, TransactionRecord, TxKind, TxStatus};

use super::{Store, opt_ts, ts_to_datetime};

impl Store {
    pub async fn insert_transaction(&self, record: &TransactionRecord) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO transactions (id, token_id, kind, amount, signature, status, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.token_id,
                record.kind.as_str(),
                record.amount,
                record.signature,
                record.status.as_str(),
                record.detail,
                record.created_at.timestamp(),
            ],
        )
        .context("inserting transaction record")?;
        Ok(())
    }

    pub async fn recent_transactions(
        &self,
        token_id: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, token_id, kind, amount, signature, status, detail, created_at
             FROM transactions WHERE token_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![token_id, limit as i64], |row| {
                let kind: String = row.get("kind")?;
                let status: String = row.get("status")?;
                Ok(TransactionRecord {
                    id: row.get("id")?,
                    token_id: row.get("token_id")?,
                    kind: TxKind::parse(&kind).unwrap_or(TxKind::Info),
                    amount: row.get("amount")?,
                    signature: row.get("signature")?,
                    status: TxStatus::parse(&status).unwrap_or(TxStatus::Pending),
                    detail: row.get("detail")?,
                    created_at: ts_to_datetime(row.get("created_at")?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn insert_claim(&self, claim: &ClaimRecord) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO claims (id, token_id, total_sol, platform_fee_sol, user_share_sol,
                signature, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                claim.id,
                claim.token_id,
                claim.total_sol,
                claim.platform_fee_sol,
                claim.user_share_sol,
                claim.signature,
                claim.started_at.timestamp(),
                claim.completed_at.map(|t| t.timestamp()),
            ],
        )
        .context("inserting claim record")?;
        Ok(())
    }

    pub async fn recent_claims(&self, token_id: &str, limit: usize) -> Result<Vec<ClaimRecord>> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, token_id, total_sol, platform_fee_sol, user_share_sol, signature,
                started_at, completed_at
             FROM claims WHERE token_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![token_id, limit as i64], |row| {
                Ok(ClaimRecord {
                    id: row.get("id")?,
                    token_id: row.get("token_id")?,
                    total_sol: row.get("total_sol")?,
                    platform_fee_sol: row.get("platform_fee_sol")?,
                    user_share_sol: row.get("user_share_sol")?,
                    signature: row.get("signature")?,
                    started_at: ts_to_datetime(row.get("started_at")?),
                    completed_at: opt_ts(row.get("completed_at")?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn insert_audit(&self, event: &AuditEvent) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO audit_log (id, kind, token_id, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.kind,
                event.token_id,
                event.detail,
                event.created_at.timestamp()
            ],
        )
        .context("inserting audit event")?;
        Ok(())
    }

    pub async fn audit_events_of_kind(&self, kind: &str) -> Result<Vec<AuditEvent>> {
        let conn = self.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, kind, token_id, detail, created_at FROM audit_log
             WHERE kind = ?1 ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([kind], |row| {
                Ok(AuditEvent {
                    id: row.get("id")?,
                    kind: row.get("kind")?,
                    token_id: row.get("token_id")?,
                    detail: row.get("detail")?,
                    created_at: ts_to_datetime(row.get("created_at")?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn save_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO balance_snapshots (token_id, dev_sol, ops_sol, dev_tokens, ops_tokens,
                claimable_sol, sol_price_usd, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(token_id) DO UPDATE SET
                dev_sol = excluded.dev_sol,
                ops_sol = excluded.ops_sol,
                dev_tokens = excluded.dev_tokens,
                ops_tokens = excluded.ops_tokens,
                claimable_sol = excluded.claimable_sol,
                sol_price_usd = excluded.sol_price_usd,
                updated_at = excluded.updated_at",
            params![
                snapshot.token_id,
                snapshot.dev_sol,
                snapshot.ops_sol,
                snapshot.dev_tokens,
                snapshot.ops_tokens,
                snapshot.claimable_sol,
                snapshot.sol_price_usd,
                snapshot.updated_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_balance_snapshot(&self, token_id: &str) -> Result<Option<BalanceSnapshot>> {
        let conn = self.lock().await;
        let snapshot = conn
            .query_row(
                "SELECT token_id, dev_sol, ops_sol, dev_tokens, ops_tokens, claimable_sol,
                    sol_price_usd, updated_at
                 FROM balance_snapshots WHERE token_id = ?1",
                [token_id],
                |row| {
                    Ok(BalanceSnapshot {
                        token_id: row.get("token_id")?,
                        dev_sol: row.get("dev_sol")?,
                        ops_sol: row.get("ops_sol")?,
                        dev_tokens: row.get("dev_tokens")?,
                        ops_tokens: row.get("ops_tokens")?,
                        claimable_sol: row.get("claimable_sol")?,
                        sol_price_usd: row.get("sol_price_usd")?,
                        updated_at: ts_to_datetime(row.get("updated_at")?),
                    })
                },
            )
            .ok();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenSource;
    use crate::store::test_fixtures::seed_token;
    use chrono::Utc;

    #[tokio::test]
    async fn transaction_history_ordering() {
        let store = Store::in_memory().unwrap();
        seed_token(&store, "t1", "Mint1", TokenSource::Launched).await;

        let rec1 = TransactionRecord::new("t1", TxKind::Buy, 0.05).confirmed("sig1");
        let rec2 = TransactionRecord::new("t1", TxKind::Sell, 120.0).failed("no route");
        store.insert_transaction(&rec1).await.unwrap();
        store.insert_transaction(&rec2).await.unwrap();

        let rows = store.recent_transactions("t1", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.signature.as_deref() == Some("sig1")));
        assert!(
            rows.iter()
                .any(|r| r.status == TxStatus::Failed && r.detail.as_deref() == Some("no route"))
        );
    }

    #[tokio::test]
    async fn claim_and_audit_round_trip() {
        let store = Store::in_memory().unwrap();
        seed_token(&store, "t1", "Mint1", TokenSource::Launched).await;

        let now = Utc::now();
        store
            .insert_claim(&ClaimRecord {
                id: "c1".into(),
                token_id: "t1".into(),
                total_sol: 0.5,
                platform_fee_sol: 0.049,
                user_share_sol: 0.441,
                signature: Some("sig".into()),
                started_at: now,
                completed_at: Some(now),
            })
            .await
            .unwrap();
        let claims = store.recent_claims("t1", 5).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].total_sol, 0.5);

        store
            .insert_audit(&AuditEvent::new("launch_completed", Some("t1"), "mint Mint1"))
            .await
            .unwrap();
        let events = store.audit_events_of_kind("launch_completed").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn balance_snapshot_upserts() {
        let store = Store::in_memory().unwrap();
        seed_token(&store, "t1", "Mint1", TokenSource::Launched).await;

        let mut snap = BalanceSnapshot {
            token_id: "t1".into(),
            dev_sol: 1.0,
            ops_sol: 2.0,
            dev_tokens: 0.0,
            ops_tokens: 500.0,
            claimable_sol: 0.2,
            sol_price_usd: Some(150.0),
            updated_at: Utc::now(),
        };
        store.save_balance_snapshot(&snap).await.unwrap();
        snap.ops_sol = 3.0;
        store.save_balance_snapshot(&snap).await.unwrap();

        let got = store.get_balance_snapshot("t1").await.unwrap().unwrap();
        assert_eq!(got.ops_sol, 3.0);
    }
}
