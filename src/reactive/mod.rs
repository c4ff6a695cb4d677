pub mod cache;
pub mod event;
pub mod parse;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::scheduler::flywheel::FlywheelScheduler;
use crate::store::Store;

pub use cache::{ProcessedSignatures, ReactiveCache, ReactiveEntry};
pub use event::EnhancedTransaction;
pub use parse::{ParsedSwap, parse_swap};

const SIGNATURE_SET_LIMIT: usize = 4000;

/// Consumes webhook batches of observed swaps and places counter-trades
/// through the flywheel's trade path. Stateless per event beyond the
/// bounded dedup set and the per-token cooldown clock.
pub struct ReactiveEngine {
    store: Store,
    flywheel: Arc<FlywheelScheduler>,
    cache: ReactiveCache,
    processed: Mutex<ProcessedSignatures>,
    /// Last counter-trade per token id; authoritative for the cooldown
    /// together with the persisted state row.
    last_trade: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ReactiveEngine {
    pub fn new(store: Store, flywheel: Arc<FlywheelScheduler>) -> Self {
        let cache = ReactiveCache::new(store.clone());
        ReactiveEngine {
            store,
            flywheel,
            cache,
            processed: Mutex::new(ProcessedSignatures::new(SIGNATURE_SET_LIMIT)),
            last_trade: Mutex::new(HashMap::new()),
        }
    }

    /// Process one webhook batch. Individual event failures are logged and
    /// never propagated — the webhook already got its 200.
    pub async fn handle_batch(&self, batch: Vec<EnhancedTransaction>) {
        for tx in batch {
            let signature = tx.signature.clone();
            if let Err(e) = self.handle_event(tx).await {
                warn!(%signature, "reactive event: {e:#}");
            }
        }
    }

    async fn handle_event(&self, tx: EnhancedTransaction) -> anyhow::Result<()> {
        // Dedup before anything else; a replayed webhook is common.
        {
            let mut processed = self.processed.lock().await;
            if !processed.insert(&tx.signature) {
                debug!(signature = %tx.signature, "duplicate webhook event");
                return Ok(());
            }
        }

        if !tx.is_swap_like() {
            return Ok(());
        }

        let Some(parsed) = parse_swap(&tx) else {
            debug!(signature = %tx.signature, "unparseable swap event");
            return Ok(());
        };

        let Some(entry) = self.cache.lookup(&parsed.mint).await else {
            return Ok(());
        };

        if is_self_transaction(&tx, &entry.ops_wallet) {
            debug!(signature = %tx.signature, "own transaction; ignoring");
            return Ok(());
        }

        if parsed.sol_amount < entry.min_trigger_sol {
            debug!(
                signature = %tx.signature,
                sol = parsed.sol_amount,
                "below reactive trigger"
            );
            return Ok(());
        }

        let now = Utc::now();
        if self.in_cooldown(&entry, now).await? {
            debug!(token = %entry.token_id, "reactive cooldown active");
            return Ok(());
        }

        let Some(token) = self.store.get_token(&entry.token_id).await? else {
            return Ok(());
        };
        let Some(config) = self.store.get_config(&entry.token_id).await? else {
            return Ok(());
        };

        let outcome = self
            .flywheel
            .execute_reactive_trade(&token, &config, parsed.side, parsed.sol_amount)
            .await?;
        if outcome.is_some() {
            self.last_trade.lock().await.insert(entry.token_id.clone(), now);
            info!(
                token = %entry.token_id,
                observed = ?parsed.side,
                sol = parsed.sol_amount,
                "counter-trade dispatched"
            );
        }
        Ok(())
    }

    /// Cooldown gate: the in-memory clock is the fast path, the persisted
    /// `last_trade_at` backs it across restarts.
    async fn in_cooldown(&self, entry: &ReactiveEntry, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let cooldown_ms = entry.cooldown_ms as i64;
        if cooldown_ms <= 0 {
            return Ok(false);
        }

        if let Some(last) = self.last_trade.lock().await.get(&entry.token_id)
            && (now - *last).num_milliseconds() < cooldown_ms
        {
            return Ok(true);
        }

        if let Some(state) = self.store.get_state(&entry.token_id).await?
            && let Some(last) = state.last_trade_at
            && (now - last).num_milliseconds() < cooldown_ms
        {
            return Ok(true);
        }

        Ok(false)
    }
}

/// A transaction is ours if the ops wallet paid the fee or shows up as a
/// sender on either transfer list.
fn is_self_transaction(tx: &EnhancedTransaction, ops_wallet: &str) -> bool {
    if tx.fee_payer == ops_wallet {
        return true;
    }
    tx.native_transfers.iter().any(|t| t.from_user_account == ops_wallet)
        || tx.token_transfers.iter().any(|t| t.from_user_account == ops_wallet)
}
