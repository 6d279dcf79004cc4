//! Workflow-side adapter for the approval orchestrator
//!
//! [`StudioApprovalGate`] implements the graph executor's
//! [`ApprovalGate`](studio_graph::ApprovalGate) seam on top of
//! [`ApprovalOrchestrator`]: it opens a record for every human step and
//! blocks on the decision. In mock mode (`USE_MOCK_AI`) the gate
//! short-circuits to an auto-approve after a 2-second delay without
//! touching the approval store.

use crate::approval::orchestrator::{ApprovalError, ApprovalOrchestrator};
use crate::approval::types::CreateApprovalRequest;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use studio_graph::{ApprovalDecision, ApprovalGate, ApprovalRequest, GraphError};
use tracing::debug;

/// Delay before the mock-mode auto approval
const MOCK_APPROVAL_DELAY: Duration = Duration::from_secs(2);

/// Gate bridging human steps to durable approvals
pub struct StudioApprovalGate {
    approvals: Arc<ApprovalOrchestrator>,
    mock_mode: bool,
}

impl StudioApprovalGate {
    pub fn new(approvals: Arc<ApprovalOrchestrator>, mock_mode: bool) -> Self {
        Self { approvals, mock_mode }
    }
}

#[async_trait]
impl ApprovalGate for StudioApprovalGate {
    async fn request_approval(&self, request: ApprovalRequest) -> studio_graph::Result<ApprovalDecision> {
        if self.mock_mode {
            debug!(step_id = %request.step_id, "Mock mode: auto-approving human step");
            tokio::time::sleep(MOCK_APPROVAL_DELAY).await;
            return Ok(ApprovalDecision::Approved);
        }

        let approval = self
            .approvals
            .create_approval(CreateApprovalRequest {
                thread_id: request.thread_id.clone(),
                step_id: request.step_id.clone(),
                project_id: request.project_id.clone(),
                workflow_name: request.workflow_name.clone(),
                prompt: request.prompt.clone(),
                context_data: request.context_data.clone(),
                risk_level: request.risk_level,
                timeout_seconds: request.timeout_seconds,
                approval_required: true,
                auto_approve_after_timeout: request.timeout_behavior == studio_graph::TimeoutBehavior::AutoApprove,
            })
            .await;

        let granted = self
            .approvals
            .wait_for_decision(&approval.approval_id, request.timeout_seconds, request.timeout_behavior)
            .await
            .map_err(|e| match e {
                ApprovalError::Timeout { id, seconds } => GraphError::Timeout {
                    operation: format!("approval {id}"),
                    duration_secs: seconds,
                },
                other => GraphError::Execution(other.to_string()),
            })?;

        Ok(if granted {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Rejected
        })
    }
}
