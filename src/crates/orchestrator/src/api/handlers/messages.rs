//! Message routing endpoints

use crate::api::error::ApiResult;
use crate::api::response;
use crate::api::routes::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use studio_agents::{BatchMessage, BatchOptions};

/// `POST /messages/mention` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionRequest {
    pub message: String,
    pub from_agent_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Wait for each target's response instead of fire-and-forget
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// `POST /messages/batch` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub messages: Vec<BatchMessage>,
    #[serde(flatten)]
    pub options: BatchOptions,
}

/// `POST /messages/mention` - parse and route a mention message
pub async fn mention(
    State(state): State<AppState>,
    Json(request): Json<MentionRequest>,
) -> ApiResult<impl IntoResponse> {
    let wait = request
        .wait
        .then(|| Duration::from_millis(request.timeout_ms.unwrap_or(30_000)));

    let outcome = state
        .router
        .route(&request.message, &request.from_agent_id, request.project_id.as_deref(), wait)
        .await?;
    Ok(response::ok(outcome))
}

/// `POST /messages/batch` - dispatch a dependency-ordered batch
pub async fn batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.router.send_batch(request.messages, request.options).await?;
    Ok(response::ok(outcome))
}

/// `POST /messages/batch/:batch_id/abort`
pub async fn abort_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.router.abort_batch(&batch_id)?;
    Ok(response::ok(serde_json::json!({ "aborted": batch_id })))
}
