//! Workflow service facade
//!
//! Thin layer between the HTTP handlers and the graph executor: request
//! shapes for invoke/resume (accepting a single step or a step list) and
//! pass-throughs for state inspection. Keeping it separate from the
//! handlers keeps the axum layer free of workflow semantics.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studio_checkpoint::Checkpoint;
use studio_graph::{GraphError, WorkflowExecutor, WorkflowState, WorkflowStep};

/// `POST /invoke` body: one step or a list of steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepsInput {
    One(Box<WorkflowStep>),
    Many(Vec<WorkflowStep>),
}

impl StepsInput {
    pub fn into_steps(self) -> Vec<WorkflowStep> {
        match self {
            StepsInput::One(step) => vec![*step],
            StepsInput::Many(steps) => steps,
        }
    }
}

/// Request body for `POST /invoke`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub workflow: StepsInput,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Request body for the resume endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub workflow: StepsInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Facade over the graph executor
pub struct WorkflowService {
    executor: Arc<WorkflowExecutor>,
}

impl WorkflowService {
    pub fn new(executor: Arc<WorkflowExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }

    pub async fn invoke(&self, request: InvokeRequest) -> Result<WorkflowState, GraphError> {
        self.executor
            .execute(request.workflow.into_steps(), &request.thread_id, request.project_id)
            .await
    }

    pub async fn current_state(&self, thread_id: &str) -> Result<Option<WorkflowState>, GraphError> {
        self.executor.get_current_state(thread_id).await
    }

    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, GraphError> {
        self.executor.get_state_history(thread_id).await
    }

    pub async fn checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: u64,
    ) -> Result<Option<WorkflowState>, GraphError> {
        self.executor.get_checkpoint(thread_id, checkpoint_id).await
    }

    pub async fn resume(&self, thread_id: &str, request: ResumeRequest) -> Result<WorkflowState, GraphError> {
        self.executor
            .resume_workflow(thread_id, request.workflow.into_steps(), request.project_id)
            .await
    }

    pub async fn resume_from(
        &self,
        thread_id: &str,
        checkpoint_id: u64,
        request: ResumeRequest,
    ) -> Result<WorkflowState, GraphError> {
        self.executor
            .resume_from_checkpoint(thread_id, checkpoint_id, request.workflow.into_steps(), request.project_id)
            .await
    }

    /// Cancel a running thread
    pub fn cancel(&self, thread_id: &str) -> bool {
        self.executor.cancel(thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_request_accepts_single_step() {
        let request: InvokeRequest = serde_json::from_value(json!({
            "workflow": {"type": "task", "id": "a", "role": "dev", "task": "t"},
            "threadId": "thread-1"
        }))
        .unwrap();

        assert_eq!(request.workflow.into_steps().len(), 1);
    }

    #[test]
    fn test_invoke_request_accepts_step_list() {
        let request: InvokeRequest = serde_json::from_value(json!({
            "workflow": [
                {"type": "task", "id": "a", "role": "dev", "task": "t"},
                {"type": "task", "id": "b", "role": "dev", "task": "t", "deps": ["a"]}
            ],
            "threadId": "thread-1",
            "projectId": "proj"
        }))
        .unwrap();

        assert_eq!(request.workflow.into_steps().len(), 2);
        assert_eq!(request.project_id.as_deref(), Some("proj"));
    }
}
