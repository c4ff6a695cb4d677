pub mod admin_routes;
pub mod error;
pub mod state;
pub mod webhook;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::sync::{Mutex, mpsc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::admin::AdminService;
use crate::amm::AmmClient;
use crate::chain::ChainClient;
use crate::config::Settings;
use crate::custody::CustodyClient;
use crate::executor::TxExecutor;
use crate::launcher::HttpLauncher;
use crate::notify::LogNotifier;
use crate::platform::PlatformLoop;
use crate::reactive::{EnhancedTransaction, ReactiveEngine};
use crate::scheduler::{Schedulers, claims::ClaimScheduler, deposits::DepositWatcher, flywheel::FlywheelScheduler};
use crate::signal::SignalEngine;
use crate::store::Store;

use state::AppState;

/// Reactive workers draining the webhook queue.
const WEBHOOK_WORKERS: usize = 4;
const WEBHOOK_QUEUE_DEPTH: usize = 256;

/// Entry point for `curvewheel serve`: wire every component, start the
/// schedulers, and run the HTTP surface until shutdown.
pub async fn serve(host: &str, port: u16, data_dir: &Path) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let settings = Settings::from_env().context("loading settings")?;

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = Store::open(&data_dir.join("curvewheel.db"))?;

    // External collaborators.
    let chain = Arc::new(ChainClient::new(&settings.rpc_url)?);
    let amm = Arc::new(AmmClient::new(&settings.amm_base_url)?);
    let custody = Arc::new(CustodyClient::new(&settings.custody_base_url)?);
    let launcher = Arc::new(HttpLauncher::new(&settings.launcher_base_url)?);
    let notifier = Arc::new(LogNotifier);

    let executor = Arc::new(TxExecutor::new(chain.clone(), custody.clone()));
    let signals = Arc::new(SignalEngine::new(amm.clone()));

    let flywheel = Arc::new(FlywheelScheduler::new(
        store.clone(),
        chain.clone(),
        amm.clone(),
        executor.clone(),
        signals.clone(),
        settings.clone(),
    ));
    let claims = Arc::new(ClaimScheduler::new(
        store.clone(),
        chain.clone(),
        amm.clone(),
        executor.clone(),
        notifier.clone(),
        settings.clone(),
    ));
    let deposits = Arc::new(DepositWatcher::new(
        store.clone(),
        chain.clone(),
        executor.clone(),
        launcher,
        notifier.clone(),
        settings.clone(),
    ));

    let schedulers = Arc::new(Schedulers::new(flywheel.clone(), claims, deposits));
    schedulers
        .start_all(
            settings.flywheel_interval,
            settings.claim_fast_interval,
            settings.claim_slow_interval,
            settings.deposit_poll_interval,
        )
        .await;

    match PlatformLoop::from_settings(
        store.clone(),
        chain.clone(),
        amm.clone(),
        executor.clone(),
        settings.clone(),
    )? {
        Some(platform) => {
            Arc::new(platform).spawn(settings.flywheel_interval);
            info!("platform token loop running");
        }
        None => info!("platform token not configured; loop disabled"),
    }

    // Webhook handoff: the HTTP handler enqueues, a small worker pool
    // drains into the reactive engine.
    let reactive = Arc::new(ReactiveEngine::new(store.clone(), flywheel.clone()));
    let (webhook_tx, webhook_rx) = mpsc::channel::<Vec<EnhancedTransaction>>(WEBHOOK_QUEUE_DEPTH);
    let webhook_rx = Arc::new(Mutex::new(webhook_rx));
    for _ in 0..WEBHOOK_WORKERS {
        let engine = reactive.clone();
        let rx = webhook_rx.clone();
        tokio::spawn(async move {
            loop {
                let batch = { rx.lock().await.recv().await };
                match batch {
                    Some(batch) => engine.handle_batch(batch).await,
                    None => break,
                }
            }
        });
    }

    let admin = Arc::new(AdminService::new(
        store.clone(),
        schedulers.clone(),
        settings.admin_pubkeys.clone(),
    ));
    if settings.admin_pubkeys.is_empty() {
        warn!("ADMIN_PUBKEYS not set; admin endpoints will reject everything");
    }

    let app_state = AppState {
        store,
        admin,
        webhook_tx,
        webhook_secret: settings.webhook_secret.clone(),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/webhooks/swaps", post(webhook::ingest_swaps))
        .route("/admin/nonce", post(admin_routes::issue_nonce))
        .route("/admin/config", post(admin_routes::update_config))
        .route("/admin/suspend", post(admin_routes::suspend))
        .route("/admin/unsuspend", post(admin_routes::unsuspend))
        .route("/admin/bulk-suspend", post(admin_routes::bulk_suspend))
        .route("/admin/limits", post(admin_routes::update_limits))
        .route("/admin/restart", post(admin_routes::restart_scheduler))
        .route("/admin/stats", post(admin_routes::stats))
        .layer(cors)
        .with_state(app_state);

    let addr = format!("{host}:{port}");
    println!("curvewheel listening on {addr}");
    println!("  Health:   GET  http://{addr}/health");
    println!("  Webhooks: POST http://{addr}/webhooks/swaps");
    println!("  Admin:    POST http://{addr}/admin/nonce");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("http server")?;

    // Let in-flight ticks drain before the process exits.
    schedulers.stop_all().await;
    Ok(())
}
