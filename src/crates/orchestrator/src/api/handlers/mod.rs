//! HTTP handler functions, grouped by resource

pub mod approvals;
pub mod messages;
pub mod workflows;

use crate::api::response;
use axum::response::IntoResponse;

/// `GET /health` - liveness probe
pub async fn health() -> impl IntoResponse {
    response::ok(serde_json::json!({ "status": "ok" }))
}
