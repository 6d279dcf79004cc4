//! API route definitions
//!
//! The full HTTP surface of the core, matching the transport-layer
//! contract: workflow invocation and state inspection, approvals, message
//! routing, and the WebSocket event stream.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{handlers, ws};
use crate::approval::ApprovalOrchestrator;
use crate::services::WorkflowService;
use studio_agents::MessageRouter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub workflows: Arc<WorkflowService>,
    pub approvals: Arc<ApprovalOrchestrator>,
    pub router: Arc<MessageRouter>,
    pub broadcast: Arc<ws::BroadcastState>,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Workflow execution and inspection
        .route("/invoke", post(handlers::workflows::invoke))
        .route("/workflows/state/:thread_id", post(handlers::workflows::workflow_state))
        .route("/workflows/history/:thread_id", post(handlers::workflows::workflow_history))
        .route(
            "/workflows/checkpoint/:thread_id/:checkpoint_id",
            post(handlers::workflows::workflow_checkpoint),
        )
        .route("/workflows/resume/:thread_id", post(handlers::workflows::resume_workflow))
        .route(
            "/workflows/resume/:thread_id/:checkpoint_id",
            post(handlers::workflows::resume_from_checkpoint),
        )
        .route("/workflows/cancel/:thread_id", post(handlers::workflows::cancel_workflow))
        // Approvals
        .route(
            "/approvals",
            post(handlers::approvals::create_approval).get(handlers::approvals::list_approvals),
        )
        .route("/approvals/process-expired", post(handlers::approvals::process_expired))
        .route("/approvals/:id", get(handlers::approvals::get_approval))
        .route("/approvals/:id/decide", post(handlers::approvals::decide))
        .route("/approvals/:id/cancel", post(handlers::approvals::cancel_approval))
        .route(
            "/approvals/projects/:project_id/pending",
            get(handlers::approvals::pending_for_project),
        )
        // Message routing
        .route("/messages/mention", post(handlers::messages::mention))
        .route("/messages/batch", post(handlers::messages::batch))
        .route("/messages/batch/:batch_id/abort", post(handlers::messages::abort_batch))
        // Real-time events
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
