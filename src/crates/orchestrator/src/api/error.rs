//! API error types and HTTP response conversion
//!
//! Every error leaving the HTTP surface is a stable, displayable string in
//! a `{success: false, error}` envelope: validation failures map to 400,
//! missing resources to 404, everything unexpected to 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use studio_agents::AgentError;
use studio_graph::GraphError;
use thiserror::Error;

use crate::approval::ApprovalError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Error envelope on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request data (including workflow validation failures)
    #[error("{0}")]
    BadRequest(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Unexpected failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse {
            success: false,
            error: self.to_string(),
        };

        tracing::error!(status = %status, error = %body.error, "API error");
        (status, Json(body)).into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Validation(msg) => ApiError::BadRequest(msg),
            GraphError::Execution(msg) if msg.contains("not found") || msg.contains("no checkpoints") => {
                ApiError::NotFound(msg)
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AgentError::InvalidBatch(_) | AgentError::Ambiguous { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ApprovalError::AlreadyResolved { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("gone".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err: ApiError = GraphError::Validation("circular dependencies: a → b → a".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("circular dependencies"));
    }

    #[test]
    fn test_agent_not_found_is_404() {
        let err: ApiError = AgentError::NotFound("dev-1".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
