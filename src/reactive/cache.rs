use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::store::Store;

/// Everything the reactive engine needs per watched mint, denormalized so
/// the hot path never joins.
#[derive(Debug, Clone)]
pub struct ReactiveEntry {
    pub token_id: String,
    pub ops_wallet: String,
    pub min_trigger_sol: f64,
    pub scale_pct: f64,
    pub max_response_pct: f64,
    pub cooldown_ms: u64,
}

const CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheInner {
    entries: HashMap<String, ReactiveEntry>,
    refreshed_at: Option<tokio::time::Instant>,
}

/// Mint → reactive config, refreshed from the store at most once per TTL.
/// Purely an optimization: the store stays authoritative.
pub struct ReactiveCache {
    store: Store,
    inner: Mutex<CacheInner>,
}

impl ReactiveCache {
    pub fn new(store: Store) -> Self {
        ReactiveCache {
            store,
            inner: Mutex::new(CacheInner { entries: HashMap::new(), refreshed_at: None }),
        }
    }

    pub async fn lookup(&self, mint: &str) -> Option<ReactiveEntry> {
        let mut inner = self.inner.lock().await;
        let stale = inner
            .refreshed_at
            .is_none_or(|t| t.elapsed() >= CACHE_TTL);
        if stale {
            match self.store.reactive_eligible().await {
                Ok(eligible) => {
                    inner.entries = eligible
                        .into_iter()
                        .map(|(token, config)| {
                            (
                                token.mint.clone(),
                                ReactiveEntry {
                                    token_id: token.id,
                                    ops_wallet: token.ops_wallet,
                                    min_trigger_sol: config.reactive.min_trigger_sol,
                                    scale_pct: config.reactive.scale_pct,
                                    max_response_pct: config.reactive.max_response_pct,
                                    cooldown_ms: config.reactive.cooldown_ms,
                                },
                            )
                        })
                        .collect();
                    inner.refreshed_at = Some(tokio::time::Instant::now());
                    debug!(mints = inner.entries.len(), "reactive cache refreshed");
                }
                // Keep serving the previous snapshot on store trouble.
                Err(e) => debug!("reactive cache refresh failed: {e:#}"),
            }
        }
        inner.entries.get(mint).cloned()
    }
}

/// Recently processed webhook signatures, bounded. When the set reaches
/// `limit` the oldest half is dropped. Loss on restart is acceptable —
/// the worst case is one duplicate counter-trade, still inside cooldown.
pub struct ProcessedSignatures {
    seen: HashSet<String>,
    order: VecDeque<String>,
    limit: usize,
}

impl ProcessedSignatures {
    pub fn new(limit: usize) -> Self {
        ProcessedSignatures {
            seen: HashSet::with_capacity(limit),
            order: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Returns false if the signature was already present; inserts (and
    /// purges if full) otherwise.
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.seen.contains(signature) {
            return false;
        }
        if self.order.len() >= self.limit {
            for _ in 0..self.limit / 2 {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        self.seen.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
