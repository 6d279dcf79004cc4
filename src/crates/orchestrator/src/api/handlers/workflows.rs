//! Workflow endpoints: invoke, state inspection, resume

use crate::api::error::{ApiError, ApiResult};
use crate::api::response;
use crate::api::routes::AppState;
use crate::services::{InvokeRequest, ResumeRequest};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

/// `POST /invoke` - validate and execute a workflow
pub async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state.workflows.invoke(request).await?;
    Ok(response::ok(result))
}

/// `POST /workflows/state/:thread_id` - latest checkpointed state
pub async fn workflow_state(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let current = state
        .workflows
        .current_state(&thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no checkpoints for thread '{thread_id}'")))?;
    Ok(response::ok(current))
}

/// `POST /workflows/history/:thread_id` - full checkpoint list
pub async fn workflow_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let history = state.workflows.history(&thread_id).await?;
    Ok(response::ok(history))
}

/// `POST /workflows/checkpoint/:thread_id/:checkpoint_id` - point-in-time read
pub async fn workflow_checkpoint(
    State(state): State<AppState>,
    Path((thread_id, checkpoint_id)): Path<(String, u64)>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state
        .workflows
        .checkpoint(&thread_id, checkpoint_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("checkpoint {checkpoint_id} not found for thread '{thread_id}'"))
        })?;
    Ok(response::ok(snapshot))
}

/// `POST /workflows/resume/:thread_id` - resume from the latest checkpoint
pub async fn resume_workflow(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state.workflows.resume(&thread_id, request).await?;
    Ok(response::ok(result))
}

/// `POST /workflows/resume/:thread_id/:checkpoint_id` - time-travel resume
pub async fn resume_from_checkpoint(
    State(state): State<AppState>,
    Path((thread_id, checkpoint_id)): Path<(String, u64)>,
    Json(request): Json<ResumeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state.workflows.resume_from(&thread_id, checkpoint_id, request).await?;
    Ok(response::ok(result))
}

/// `POST /workflows/cancel/:thread_id` - abort a running thread
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.workflows.cancel(&thread_id) {
        return Err(ApiError::NotFound(format!("no running workflow for thread '{thread_id}'")));
    }
    Ok(response::ok(serde_json::json!({ "cancelled": thread_id })))
}
