//! Execution seams: step runners, approval gates, binding resolution
//!
//! The executor never talks to agents, approval stores, or config stores
//! directly. It goes through the three traits in this module, so the
//! orchestrator wires in real implementations and tests wire in scripted
//! ones. This is also what breaks the type-level cycle between the
//! workflow layer and the agent process plane.

use crate::error::Result;
use crate::step::{InteractionType, RiskLevel, StepResult, TaskStep, TimeoutBehavior, WorkflowState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Read-only snapshot of run state handed to a step runner
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    pub thread_id: String,
    pub project_id: Option<String>,
    pub step_results: HashMap<String, StepResult>,
    pub step_outputs: HashMap<String, String>,
    pub session_ids: HashMap<String, String>,
}

impl WorkflowContext {
    /// Snapshot the relevant parts of the current state
    pub fn from_state(state: &WorkflowState) -> Self {
        Self {
            thread_id: state.thread_id.clone(),
            project_id: state.project_id.clone(),
            step_results: state.step_results.clone(),
            step_outputs: state.step_outputs.clone(),
            session_ids: state.session_ids.clone(),
        }
    }
}

/// What a task execution produced
#[derive(Debug, Clone)]
pub struct StepRunOutput {
    pub response: String,
    /// LLM session handle for the agent that ran the step, when known
    pub session_id: Option<String>,
}

/// Executes one task step against its bound agent
///
/// `prompt` arrives with all template variables already substituted.
/// Errors mark the step failed; dependants are then skipped.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_task(&self, step: &TaskStep, prompt: &str, ctx: &WorkflowContext) -> Result<StepRunOutput>;
}

/// A pending human decision, as the workflow sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub thread_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub prompt: String,
    pub interaction_type: InteractionType,
    pub timeout_seconds: u64,
    pub timeout_behavior: TimeoutBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Step-history snapshot shown to the approver
    pub context_data: serde_json::Value,
}

/// Outcome of a resolved human gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Suspends a human step until a decision arrives
///
/// Implementations own the waiting strategy and the timeout behaviour
/// (`fail` surfaces [`GraphError::Timeout`](crate::GraphError::Timeout),
/// `auto-approve` resolves `Approved` on budget exhaustion, `infinite`
/// waits without a budget).
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> Result<ApprovalDecision>;
}

/// Gate used in mock mode: approves unconditionally after a short delay
#[derive(Debug, Clone)]
pub struct AutoApprovalGate {
    delay: Duration,
}

impl AutoApprovalGate {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for AutoApprovalGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl ApprovalGate for AutoApprovalGate {
    async fn request_approval(&self, _request: ApprovalRequest) -> Result<ApprovalDecision> {
        tokio::time::sleep(self.delay).await;
        Ok(ApprovalDecision::Approved)
    }
}

/// Resolves step bindings during validation
///
/// Role lookups match case-insensitively, project scope first and global
/// scope as fallback.
#[async_trait]
pub trait BindingResolver: Send + Sync {
    /// Does this concrete agent exist in the project?
    async fn agent_exists(&self, project_id: Option<&str>, agent_id: &str) -> bool;

    /// Resolve a role to an agent config id, or `None` when unknown
    async fn resolve_role(&self, project_id: Option<&str>, role: &str) -> Option<String>;
}

/// Resolver that accepts every binding (tests, trusted callers)
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveBindings;

#[async_trait]
impl BindingResolver for PermissiveBindings {
    async fn agent_exists(&self, _project_id: Option<&str>, _agent_id: &str) -> bool {
        true
    }

    async fn resolve_role(&self, _project_id: Option<&str>, role: &str) -> Option<String> {
        Some(role.to_lowercase())
    }
}
