use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::reactive::EnhancedTransaction;

use super::error::ApiError;
use super::state::AppState;

/// Webhook ingest. Accepts a single enhanced transaction or an array,
/// enqueues the batch, and answers 200 immediately — processing failures
/// stay on our side of the wire.
pub async fn ingest_swaps(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    verify_secret(&state.webhook_secret, &headers)?;

    let batch = parse_batch(body);
    if batch.is_empty() {
        debug!("webhook delivered no parseable events");
        return Ok(Json(json!({ "success": true })));
    }

    // try_send keeps the handler non-blocking; a full queue drops the
    // batch (bounded backlog beats unbounded memory).
    if let Err(e) = state.webhook_tx.try_send(batch) {
        warn!("webhook queue full; dropping batch: {e}");
    }
    Ok(Json(json!({ "success": true })))
}

fn verify_secret(expected: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    if expected.is_empty() {
        return Ok(());
    }
    let provided = headers
        .get("x-helius-secret")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });
    match provided {
        Some(secret) if secret == expected => Ok(()),
        _ => Err(ApiError::Unauthorized("bad webhook secret".into())),
    }
}

/// Single object or array; events that fail to deserialize are skipped,
/// never fatal for the batch.
fn parse_batch(body: Value) -> Vec<EnhancedTransaction> {
    let items = match body {
        Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<EnhancedTransaction>(item) {
            Ok(tx) => Some(tx),
            Err(e) => {
                debug!("skipping malformed webhook event: {e}");
                None
            }
        })
        .collect()
}
