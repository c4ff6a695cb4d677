mod common;

use std::sync::Arc;
use std::time::Duration;

use curvewheel::admin::{AdminService, RestartRequest};
use curvewheel::config::Settings;
use curvewheel::executor::TxExecutor;
use curvewheel::model::TokenSource;
use curvewheel::notify::LogNotifier;
use curvewheel::scheduler::claims::ClaimScheduler;
use curvewheel::scheduler::deposits::DepositWatcher;
use curvewheel::scheduler::flywheel::FlywheelScheduler;
use curvewheel::scheduler::{SchedulerKind, Schedulers};
use curvewheel::signal::SignalEngine;
use curvewheel::store::Store;

use common::{MockAmm, MockChain, MockCustody, MockLauncher, seed_token};

struct Rig {
    store: Store,
    schedulers: Arc<Schedulers>,
    admin: AdminService,
}

fn rig() -> Rig {
    let settings = Settings::default();
    let store = Store::in_memory().unwrap();
    let chain = MockChain::new();
    let amm = MockAmm::new();
    let custody = MockCustody::new();
    let notifier = Arc::new(LogNotifier);
    let executor = Arc::new(TxExecutor::new(chain.clone(), custody));
    let signals = Arc::new(SignalEngine::new(amm.clone()));

    let flywheel = Arc::new(
        FlywheelScheduler::new(
            store.clone(),
            chain.clone(),
            amm.clone(),
            executor.clone(),
            signals,
            settings.clone(),
        )
        .with_inter_token_delay(Duration::ZERO),
    );
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
        chain,
        executor,
        MockLauncher::new(),
        notifier,
        settings,
    ));

    let schedulers = Arc::new(Schedulers::new(flywheel, claims, deposits));
    let admin = AdminService::new(store.clone(), schedulers.clone(), vec![]);
    Rig { store, schedulers, admin }
}

#[tokio::test]
async fn suspend_is_idempotent_and_kills_automation() {
    let rig = rig();
    seed_token(&rig.store, "t1", "Mint1", TokenSource::Launched).await;

    rig.admin.suspend("t1", "abuse").await.unwrap();
    let token = rig.store.get_token("t1").await.unwrap().unwrap();
    assert!(token.is_suspended);
    let config = rig.store.get_config("t1").await.unwrap().unwrap();
    assert!(!config.flywheel_active);
    assert!(!config.market_making_enabled);
    assert!(!config.auto_claim_enabled);

    // suspending again succeeds and keeps the reason
    rig.admin.suspend("t1", "abuse").await.unwrap();
    let token = rig.store.get_token("t1").await.unwrap().unwrap();
    assert_eq!(token.suspend_reason.as_deref(), Some("abuse"));
}

#[tokio::test]
async fn unsuspend_does_not_restore_automation() {
    let rig = rig();
    seed_token(&rig.store, "t1", "Mint1", TokenSource::Launched).await;

    rig.admin.suspend("t1", "review").await.unwrap();
    rig.admin.unsuspend("t1").await.unwrap();

    let token = rig.store.get_token("t1").await.unwrap().unwrap();
    assert!(!token.is_suspended);
    assert!(token.suspend_reason.is_none());
    // the owner re-enables explicitly; flags stay off
    let config = rig.store.get_config("t1").await.unwrap().unwrap();
    assert!(!config.flywheel_active);
}

#[tokio::test]
async fn bulk_suspend_spares_the_platform_token() {
    let rig = rig();
    seed_token(&rig.store, "t1", "Mint1", TokenSource::Launched).await;
    seed_token(&rig.store, "t2", "Mint2", TokenSource::Registered).await;
    seed_token(&rig.store, "pt", "MintP", TokenSource::Platform).await;

    let touched = rig.admin.bulk_suspend("maintenance").await.unwrap();
    assert_eq!(touched, 2);
    assert!(!rig.store.get_token("pt").await.unwrap().unwrap().is_suspended);

    // audit trail records the sweep
    let audits = rig.store.audit_events_of_kind("bulk_suspend").await.unwrap();
    assert_eq!(audits.len(), 1);
}

#[tokio::test]
async fn limits_update_persists() {
    let rig = rig();
    seed_token(&rig.store, "t1", "Mint1", TokenSource::Launched).await;

    rig.admin
        .update_limits(
            "t1",
            &curvewheel::admin::LimitsUpdate {
                daily_trade_limit_sol: Some(5.0),
                max_position_size_sol: Some(2.0),
                risk_level: Some("conservative".into()),
            },
        )
        .await
        .unwrap();

    let token = rig.store.get_token("t1").await.unwrap().unwrap();
    assert_eq!(token.daily_trade_limit_sol, Some(5.0));
    assert_eq!(token.max_position_size_sol, Some(2.0));
    assert_eq!(token.risk_level.as_deref(), Some("conservative"));

    // unknown token is a clean error
    assert!(
        rig.admin
            .update_limits(
                "missing",
                &curvewheel::admin::LimitsUpdate {
                    daily_trade_limit_sol: None,
                    max_position_size_sol: None,
                    risk_level: None,
                },
            )
            .await
            .is_err()
    );
}

#[tokio::test]
async fn scheduler_restart_stops_and_starts() {
    let rig = rig();
    rig.schedulers
        .start(SchedulerKind::Flywheel, Duration::from_secs(3600))
        .await;

    rig.admin
        .restart_scheduler(&RestartRequest {
            scheduler: "flywheel".into(),
            interval_secs: Some(1800),
            trade_budget: Some(10),
        })
        .await
        .unwrap();

    let audits = rig.store.audit_events_of_kind("scheduler_restart").await.unwrap();
    assert_eq!(audits.len(), 1);

    // unknown scheduler name is rejected
    assert!(
        rig.admin
            .restart_scheduler(&RestartRequest {
                scheduler: "bogus".into(),
                interval_secs: None,
                trade_budget: None,
            })
            .await
            .is_err()
    );

    rig.schedulers.stop_all().await;
}
