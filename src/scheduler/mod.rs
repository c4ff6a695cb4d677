pub mod algorithms;
pub mod claims;
pub mod deposits;
pub mod flywheel;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use claims::ClaimScheduler;
use deposits::DepositWatcher;
use flywheel::FlywheelScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    Flywheel,
    ClaimFast,
    ClaimSlow,
    Deposit,
}

impl SchedulerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Flywheel => "flywheel",
            SchedulerKind::ClaimFast => "claim_fast",
            SchedulerKind::ClaimSlow => "claim_slow",
            SchedulerKind::Deposit => "deposit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flywheel" => Some(SchedulerKind::Flywheel),
            "claim_fast" => Some(SchedulerKind::ClaimFast),
            "claim_slow" => Some(SchedulerKind::ClaimSlow),
            "deposit" => Some(SchedulerKind::Deposit),
            _ => None,
        }
    }
}

struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
    interval: Duration,
}

/// Owns the long-lived scheduler tasks. Each is a ticker-driven loop; a
/// stop broadcasts shutdown and waits for the in-flight tick to drain.
pub struct Schedulers {
    pub flywheel: Arc<FlywheelScheduler>,
    pub claims: Arc<ClaimScheduler>,
    pub deposits: Arc<DepositWatcher>,
    handles: Mutex<HashMap<SchedulerKind, SchedulerHandle>>,
}

impl Schedulers {
    pub fn new(
        flywheel: Arc<FlywheelScheduler>,
        claims: Arc<ClaimScheduler>,
        deposits: Arc<DepositWatcher>,
    ) -> Self {
        Schedulers { flywheel, claims, deposits, handles: Mutex::new(HashMap::new()) }
    }

    pub async fn start_all(
        &self,
        flywheel_interval: Duration,
        claim_fast_interval: Duration,
        claim_slow_interval: Duration,
        deposit_interval: Duration,
    ) {
        self.start(SchedulerKind::Flywheel, flywheel_interval).await;
        self.start(SchedulerKind::ClaimFast, claim_fast_interval).await;
        self.start(SchedulerKind::ClaimSlow, claim_slow_interval).await;
        self.start(SchedulerKind::Deposit, deposit_interval).await;
    }

    pub async fn start(&self, kind: SchedulerKind, interval: Duration) {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(&kind) {
            warn!(scheduler = kind.as_str(), "already running; start ignored");
            return;
        }

        let (shutdown, shutdown_rx) = broadcast::channel::<()>(1);
        let join = match kind {
            SchedulerKind::Flywheel => {
                let scheduler = self.flywheel.clone();
                spawn_loop(kind, interval, shutdown_rx, move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.tick().await }
                })
            }
            SchedulerKind::ClaimFast => {
                let scheduler = self.claims.clone();
                spawn_loop(kind, interval, shutdown_rx, move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.fast_tick().await }
                })
            }
            SchedulerKind::ClaimSlow => {
                let scheduler = self.claims.clone();
                spawn_loop(kind, interval, shutdown_rx, move || {
                    let scheduler = scheduler.clone();
                    async move { scheduler.slow_tick().await }
                })
            }
            SchedulerKind::Deposit => {
                let watcher = self.deposits.clone();
                spawn_loop(kind, interval, shutdown_rx, move || {
                    let watcher = watcher.clone();
                    async move { watcher.tick().await }
                })
            }
        };

        info!(scheduler = kind.as_str(), interval_secs = interval.as_secs(), "started");
        handles.insert(kind, SchedulerHandle { shutdown, join, interval });
    }

    pub async fn stop(&self, kind: SchedulerKind) {
        let handle = { self.handles.lock().await.remove(&kind) };
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(());
            let _ = handle.join.await;
            info!(scheduler = kind.as_str(), "stopped");
        }
    }

    /// Stop then start with an optionally changed interval; the flywheel's
    /// per-tick budget can be adjusted at the same time.
    pub async fn restart(
        &self,
        kind: SchedulerKind,
        new_interval: Option<Duration>,
        new_budget: Option<u32>,
    ) {
        let previous = { self.handles.lock().await.get(&kind).map(|h| h.interval) };
        self.stop(kind).await;
        if kind == SchedulerKind::Flywheel
            && let Some(budget) = new_budget
        {
            self.flywheel.set_trade_budget(budget);
        }
        let interval = new_interval
            .or(previous)
            .unwrap_or(Duration::from_secs(60));
        self.start(kind, interval).await;
    }

    pub async fn stop_all(&self) {
        for kind in [
            SchedulerKind::Flywheel,
            SchedulerKind::ClaimFast,
            SchedulerKind::ClaimSlow,
            SchedulerKind::Deposit,
        ] {
            self.stop(kind).await;
        }
    }
}

/// Ticker loop: tick, then select between the next interval and shutdown.
/// The in-flight tick always completes before the task exits.
fn spawn_loop<F, Fut>(
    kind: SchedulerKind,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    tick_fn: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick_fn().await;
                }
                _ = shutdown.recv() => {
                    info!(scheduler = kind.as_str(), "shutdown signal; draining");
                    break;
                }
            }
        }
    })
}
