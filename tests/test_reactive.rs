mod common;

use std::sync::Arc;
use std::time::Duration;

use curvewheel::config::Settings;
use curvewheel::executor::TxExecutor;
use curvewheel::model::token_config::Algorithm;
use curvewheel::model::{TokenSource, TxKind};
use curvewheel::reactive::{EnhancedTransaction, ReactiveEngine};
use curvewheel::scheduler::flywheel::FlywheelScheduler;
use curvewheel::signal::SignalEngine;
use curvewheel::store::Store;
use serde_json::json;

use common::{MockAmm, MockChain, MockCustody, seed_token};

struct Rig {
    store: Store,
    chain: Arc<MockChain>,
    amm: Arc<MockAmm>,
    engine: ReactiveEngine,
}

async fn reactive_rig() -> (Rig, curvewheel::model::Token) {
    let store = Store::in_memory().unwrap();
    let chain = MockChain::new();
    let amm = MockAmm::new();
    let custody = MockCustody::new();
    let executor = Arc::new(TxExecutor::new(chain.clone(), custody));
    let signals = Arc::new(SignalEngine::new(amm.clone()));
    let flywheel = Arc::new(
        FlywheelScheduler::new(
            store.clone(),
            chain.clone(),
            amm.clone(),
            executor,
            signals,
            Settings::default(),
        )
        .with_inter_token_delay(Duration::ZERO),
    );
    let engine = ReactiveEngine::new(store.clone(), flywheel);

    let (token, mut config) = seed_token(&store, "t1", "MintM", TokenSource::Launched).await;
    config.algorithm = Algorithm::TransactionReactive;
    config.reactive.enabled = true;
    config.reactive.min_trigger_sol = 0.2;
    config.reactive.scale_pct = 50.0;
    config.reactive.max_response_pct = 30.0;
    config.reactive.cooldown_ms = 30_000;
    store.update_config(&config).await.unwrap();

    chain.set_sol(&token.ops_wallet, 2.0).await;
    chain.set_tokens(&token.ops_wallet, "MintM", 1000.0).await;
    amm.set_price("MintM", 1000.0).await;

    (Rig { store, chain, amm, engine }, token)
}

fn swap_event(signature: &str, fee_payer: &str, native_input_lamports: u64) -> EnhancedTransaction {
    serde_json::from_value(json!({
        "signature": signature,
        "type": "SWAP",
        "feePayer": fee_payer,
        "events": {"swap": {
            "nativeInput": {"account": fee_payer, "amount": native_input_lamports},
            "tokenOutputs": [{"mint": "MintM", "userAccount": fee_payer}]
        }}
    }))
    .unwrap()
}

#[tokio::test]
async fn observed_buy_triggers_scaled_counter_sell() {
    let (rig, token) = reactive_rig().await;

    // 0.3 SOL buy observed → respond with a 0.15 SOL-equivalent sell
    rig.engine
        .handle_batch(vec![swap_event("obs-1", "SomeTrader", 300_000_000)])
        .await;

    let records = rig.store.recent_transactions("t1", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, TxKind::Sell);
    assert_eq!(records[0].detail.as_deref(), Some("reactive"));
    // 0.3 SOL × 50% scale at 1000 tokens/SOL
    assert!((records[0].amount - 150.0).abs() < 1e-6);

    // 150 tokens left the ops wallet (0.15 SOL at 1000/SOL)
    let tokens = rig.chain.tokens_of(&token.ops_wallet, "MintM").await;
    assert!((tokens - 850.0).abs() < 1e-6, "ops tokens {tokens}");

    let state = rig.store.get_state("t1").await.unwrap().unwrap();
    assert!(state.last_trade_at.is_some());
    assert_eq!(state.last_check_result.as_deref(), Some("reactive_trade"));
}

#[tokio::test]
async fn response_clamped_to_max_response_pct() {
    let (rig, token) = reactive_rig().await;

    // a whale buy of 100 SOL would scale to 50 SOL-equivalent; the 30%
    // cap of 1000 tokens limits the sell to 300 tokens
    rig.engine
        .handle_batch(vec![swap_event("obs-1", "Whale", 100_000_000_000)])
        .await;

    let tokens = rig.chain.tokens_of(&token.ops_wallet, "MintM").await;
    assert!((tokens - 700.0).abs() < 1e-6, "ops tokens {tokens}");
}

#[tokio::test]
async fn duplicate_signature_is_processed_once() {
    let (rig, _token) = reactive_rig().await;

    let event = swap_event("obs-1", "SomeTrader", 300_000_000);
    rig.engine.handle_batch(vec![event.clone(), event.clone()]).await;
    rig.engine.handle_batch(vec![event]).await;

    assert_eq!(rig.store.recent_transactions("t1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cooldown_suppresses_follow_up_events() {
    let (rig, _token) = reactive_rig().await;

    rig.engine
        .handle_batch(vec![swap_event("obs-1", "TraderA", 300_000_000)])
        .await;
    // different signature, inside the 30 s cooldown
    rig.engine
        .handle_batch(vec![swap_event("obs-2", "TraderB", 400_000_000)])
        .await;

    assert_eq!(rig.store.recent_transactions("t1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn own_transactions_never_trigger() {
    let (rig, token) = reactive_rig().await;

    rig.engine
        .handle_batch(vec![swap_event("obs-1", &token.ops_wallet, 300_000_000)])
        .await;

    assert!(rig.store.recent_transactions("t1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn below_trigger_threshold_ignored() {
    let (rig, _token) = reactive_rig().await;

    // 0.15 SOL < 0.2 trigger
    rig.engine
        .handle_batch(vec![swap_event("obs-1", "SomeTrader", 150_000_000)])
        .await;

    assert!(rig.store.recent_transactions("t1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unwatched_mint_ignored() {
    let (rig, _token) = reactive_rig().await;

    let event: EnhancedTransaction = serde_json::from_value(json!({
        "signature": "obs-1",
        "type": "SWAP",
        "feePayer": "SomeTrader",
        "events": {"swap": {
            "nativeInput": {"account": "SomeTrader", "amount": 300_000_000u64},
            "tokenOutputs": [{"mint": "OtherMint", "userAccount": "SomeTrader"}]
        }}
    }))
    .unwrap();
    rig.engine.handle_batch(vec![event]).await;

    assert!(rig.store.recent_transactions("t1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn observed_sell_triggers_counter_buy() {
    let (rig, token) = reactive_rig().await;

    let event: EnhancedTransaction = serde_json::from_value(json!({
        "signature": "obs-1",
        "type": "SWAP",
        "feePayer": "SomeTrader",
        "events": {"swap": {
            "nativeOutput": {"account": "SomeTrader", "amount": 400_000_000u64},
            "tokenInputs": [{"mint": "MintM", "userAccount": "SomeTrader"}]
        }}
    }))
    .unwrap();
    rig.engine.handle_batch(vec![event]).await;

    let records = rig.store.recent_transactions("t1", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, TxKind::Buy);
    // 0.4 × 50% = 0.2 SOL spent
    let sol = rig.chain.sol_of(&token.ops_wallet).await;
    assert!((sol - 1.8).abs() < 1e-6, "ops sol {sol}");
}
