use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::admin::auth::{self, MUTATION_WINDOW_SECS, SESSION_WINDOW_SECS, SignedRequest};
use crate::admin::{LimitsUpdate, RestartRequest};
use crate::model::token_config::TokenConfig;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NonceRequest {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// Step one of every admin call: fetch a nonce bound to the intended
/// payload, sign the returned message, then submit the mutation.
pub async fn issue_nonce(
    State(state): State<AppState>,
    Json(request): Json<NonceRequest>,
) -> Result<Json<Value>, ApiError> {
    let issue = auth::issue_nonce(&state.store, &request.action, &request.payload).await?;
    Ok(Json(serde_json::to_value(issue).map_err(|e| ApiError::Internal(e.to_string()))?))
}

async fn verify(
    state: &AppState,
    request: &SignedRequest,
    action: &str,
    window: i64,
) -> Result<(), ApiError> {
    auth::verify(&state.store, &state.admin.admin_pubkeys, request, action, window)
        .await
        .map_err(|e| ApiError::Unauthorized(format!("{e:#}")))
}

/// Replace a token's config. Invariant violations come back as 400.
pub async fn update_config(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "config", MUTATION_WINDOW_SECS).await?;
    let config: TokenConfig = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(format!("config shape: {e}")))?;
    config.validate().map_err(ApiError::BadRequest)?;
    state
        .store
        .update_config(&config)
        .await
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct SuspendPayload {
    token_id: String,
    #[serde(default)]
    reason: String,
}

pub async fn suspend(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "suspend", MUTATION_WINDOW_SECS).await?;
    let payload: SuspendPayload = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .admin
        .suspend(&payload.token_id, &payload.reason)
        .await
        .map_err(|e| ApiError::NotFound(format!("{e:#}")))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn unsuspend(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "unsuspend", MUTATION_WINDOW_SECS).await?;
    let payload: SuspendPayload = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .admin
        .unsuspend(&payload.token_id)
        .await
        .map_err(|e| ApiError::NotFound(format!("{e:#}")))?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct BulkSuspendPayload {
    #[serde(default)]
    reason: String,
}

pub async fn bulk_suspend(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "bulk_suspend", MUTATION_WINDOW_SECS).await?;
    let payload: BulkSuspendPayload = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let touched = state.admin.bulk_suspend(&payload.reason).await?;
    Ok(Json(json!({ "success": true, "suspended": touched })))
}

#[derive(Debug, Deserialize)]
struct LimitsPayload {
    token_id: String,
    #[serde(flatten)]
    limits: LimitsUpdate,
}

pub async fn update_limits(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "limits", MUTATION_WINDOW_SECS).await?;
    let payload: LimitsPayload = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .admin
        .update_limits(&payload.token_id, &payload.limits)
        .await
        .map_err(|e| ApiError::NotFound(format!("{e:#}")))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn restart_scheduler(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "restart", MUTATION_WINDOW_SECS).await?;
    let payload: RestartRequest = serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state
        .admin
        .restart_scheduler(&payload)
        .await
        .map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    Ok(Json(json!({ "success": true })))
}

/// Read session: platform-wide stats, longer signature window.
pub async fn stats(
    State(state): State<AppState>,
    Json(request): Json<SignedRequest>,
) -> Result<Json<Value>, ApiError> {
    verify(&state, &request, "stats", SESSION_WINDOW_SECS).await?;
    let stats = state.admin.stats().await?;
    Ok(Json(stats))
}
