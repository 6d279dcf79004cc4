//! Approval endpoints

use crate::api::error::ApiResult;
use crate::api::response;
use crate::api::routes::AppState;
use crate::approval::{ApprovalFilter, CreateApprovalRequest, Decision};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

/// `POST /approvals/:id/decide` body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    pub decision: Decision,
    #[serde(default)]
    pub decided_by: Option<String>,
}

/// `POST /approvals/:id/cancel` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

/// `POST /approvals` - open a new approval
pub async fn create_approval(
    State(state): State<AppState>,
    Json(request): Json<CreateApprovalRequest>,
) -> ApiResult<impl IntoResponse> {
    let approval = state.approvals.create_approval(request).await;
    Ok(response::created(approval))
}

/// `GET /approvals/:id`
pub async fn get_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let approval = state.approvals.get_approval(&approval_id).await?;
    Ok(response::ok(approval))
}

/// `POST /approvals/:id/decide` - apply a human decision
pub async fn decide(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<DecideRequest>,
) -> ApiResult<impl IntoResponse> {
    let decided_by = request.decided_by.as_deref().unwrap_or("operator");
    let approval = state
        .approvals
        .process_decision(&approval_id, request.decision, decided_by)
        .await?;
    Ok(response::ok(approval))
}

/// `GET /approvals` - list with optional status/project/thread filters
pub async fn list_approvals(
    State(state): State<AppState>,
    Query(filter): Query<ApprovalFilter>,
) -> ApiResult<impl IntoResponse> {
    Ok(response::ok(state.approvals.list_approvals(&filter).await))
}

/// `POST /approvals/:id/cancel`
pub async fn cancel_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<impl IntoResponse> {
    let cancelled_by = request.cancelled_by.as_deref().unwrap_or("operator");
    let approval = state.approvals.cancel_approval(&approval_id, cancelled_by).await?;
    Ok(response::ok(approval))
}

/// `GET /approvals/projects/:project_id/pending`
pub async fn pending_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(response::ok(state.approvals.get_pending_for_project(&project_id).await))
}

/// `POST /approvals/process-expired` - sweep expired records now
pub async fn process_expired(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let count = state.approvals.process_expired_approvals().await;
    Ok(response::ok(serde_json::json!({ "expired": count })))
}
