//! Workflow step model and run state
//!
//! Steps are a tagged union - `task`, `parallel`, `loop`, `conditional`,
//! `human` - discriminated by a `type` field on the wire. A workflow run
//! ([`WorkflowState`]) carries the step list plus everything the executor
//! accumulates: per-step results, the output map used for template
//! substitution, and the LLM session ids handed back by agents.
//!
//! # Example step list (wire form)
//!
//! ```json
//! [
//!   {"type": "task", "id": "a", "role": "developer", "task": "say hello"},
//!   {"type": "task", "id": "b", "role": "developer",
//!    "task": "say {a.output}", "deps": ["a"]}
//! ]
//! ```

use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single unit of workflow execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkflowStep {
    /// Prompt executed against a bound agent
    Task(TaskStep),
    /// Concurrent execution of referenced sibling steps
    Parallel(ParallelStep),
    /// Repeated execution of referenced steps over an item list
    Loop(LoopStep),
    /// Branch on a condition evaluated against prior step results
    Conditional(ConditionalStep),
    /// Human-in-the-loop gate
    Human(HumanStep),
}

/// Prompt step bound to a role or a concrete agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub id: String,
    /// Logical agent identity, resolved project-first then globally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Concrete agent binding, bypassing role resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Prompt template; `{stepId.field}` references are substituted
    pub task: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// Container step running its referenced siblings concurrently
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParallelStep {
    pub id: String,
    /// Step ids executed concurrently; results stored under their own ids
    pub parallel_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// Container step iterating referenced steps over `items`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopStep {
    pub id: String,
    pub items: Vec<String>,
    /// Variable name substituted into iteration copies (`{<loopVar>}`)
    pub loop_var: String,
    pub max_iterations: usize,
    /// Step ids executed sequentially once per iteration
    pub loop_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// Conditional routing step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalStep {
    pub id: String,
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// Human-in-the-loop gate step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HumanStep {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub interaction_type: InteractionType,
    /// 0 means no finite budget (only meaningful with `Infinite`)
    #[serde(default)]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub timeout_behavior: TimeoutBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
}

/// What the human gate asks for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    #[default]
    Approval,
    Notification,
    Input,
}

/// How an unanswered gate resolves when its budget runs out
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutBehavior {
    #[default]
    Fail,
    AutoApprove,
    Infinite,
}

/// Risk classification attached to approvals
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl WorkflowStep {
    /// Step id, unique within the workflow
    pub fn id(&self) -> &str {
        match self {
            WorkflowStep::Task(s) => &s.id,
            WorkflowStep::Parallel(s) => &s.id,
            WorkflowStep::Loop(s) => &s.id,
            WorkflowStep::Conditional(s) => &s.id,
            WorkflowStep::Human(s) => &s.id,
        }
    }

    /// Declared dependencies
    pub fn deps(&self) -> &[String] {
        match self {
            WorkflowStep::Task(s) => &s.deps,
            WorkflowStep::Parallel(s) => &s.deps,
            WorkflowStep::Loop(s) => &s.deps,
            WorkflowStep::Conditional(s) => &s.deps,
            WorkflowStep::Human(s) => &s.deps,
        }
    }

    /// Wire name of the step type
    pub fn step_type(&self) -> &'static str {
        match self {
            WorkflowStep::Task(_) => "task",
            WorkflowStep::Parallel(_) => "parallel",
            WorkflowStep::Loop(_) => "loop",
            WorkflowStep::Conditional(_) => "conditional",
            WorkflowStep::Human(_) => "human",
        }
    }

    /// Ids of steps this step executes itself (children of containers and
    /// branch targets). Children are excluded from top-level scheduling.
    pub fn referenced_steps(&self) -> Vec<&str> {
        match self {
            WorkflowStep::Parallel(s) => s.parallel_steps.iter().map(String::as_str).collect(),
            WorkflowStep::Loop(s) => s.loop_steps.iter().map(String::as_str).collect(),
            WorkflowStep::Conditional(s) => s
                .true_branch
                .iter()
                .chain(s.false_branch.iter())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Terminal state of one executed step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Recorded outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub status: StepStatus,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Success,
            response: response.into(),
            session_id: None,
            duration_ms: 0,
        }
    }

    pub fn failed(response: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            response: response.into(),
            session_id: None,
            duration_ms: 0,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            response: reason.into(),
            session_id: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Complete state of one workflow run (thread)
///
/// This is the unit of checkpointing: the executor serialises the whole
/// struct after every node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub step_results: HashMap<String, StepResult>,
    /// Raw output text per step, the substitution source for `{id.output}`
    #[serde(default)]
    pub step_outputs: HashMap<String, String>,
    #[serde(default)]
    pub session_ids: HashMap<String, String>,
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl WorkflowState {
    /// Fresh run state for a step list
    pub fn new(thread_id: impl Into<String>, project_id: Option<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            thread_id: thread_id.into(),
            project_id,
            steps,
            ..Default::default()
        }
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// Record a step outcome, mirroring the response into `step_outputs`
    pub fn record(&mut self, step_id: &str, result: StepResult) {
        self.step_outputs.insert(step_id.to_string(), result.response.clone());
        if let Some(session_id) = &result.session_id {
            self.session_ids.insert(step_id.to_string(), session_id.clone());
        }
        self.step_results.insert(step_id.to_string(), result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserializes_from_tagged_json() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "type": "task",
            "id": "a",
            "role": "developer",
            "task": "say hello"
        }))
        .unwrap();

        match &step {
            WorkflowStep::Task(task) => {
                assert_eq!(task.id, "a");
                assert_eq!(task.role.as_deref(), Some("developer"));
                assert!(task.deps.is_empty());
            }
            other => panic!("expected task step, got {other:?}"),
        }
        assert_eq!(step.step_type(), "task");
    }

    #[test]
    fn test_human_step_defaults() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "type": "human",
            "id": "h",
            "prompt": "deploy to production?"
        }))
        .unwrap();

        let WorkflowStep::Human(human) = step else {
            panic!("expected human step");
        };
        assert_eq!(human.interaction_type, InteractionType::Approval);
        assert_eq!(human.timeout_behavior, TimeoutBehavior::Fail);
        assert_eq!(human.timeout_seconds, 0);
    }

    #[test]
    fn test_timeout_behavior_is_kebab_case() {
        let behavior: TimeoutBehavior = serde_json::from_value(json!("auto-approve")).unwrap();
        assert_eq!(behavior, TimeoutBehavior::AutoApprove);
    }

    #[test]
    fn test_referenced_steps_for_containers() {
        let parallel: WorkflowStep = serde_json::from_value(json!({
            "type": "parallel",
            "id": "p",
            "parallelSteps": ["x", "y", "z"]
        }))
        .unwrap();
        assert_eq!(parallel.referenced_steps(), vec!["x", "y", "z"]);

        let conditional: WorkflowStep = serde_json::from_value(json!({
            "type": "conditional",
            "id": "c",
            "condition": {"version": "1.0", "expression": "{a.output}"},
            "trueBranch": "t"
        }))
        .unwrap();
        assert_eq!(conditional.referenced_steps(), vec!["t"]);
    }

    #[test]
    fn test_state_record_mirrors_outputs_and_sessions() {
        let mut state = WorkflowState::new("thread-1", None, vec![]);
        let mut result = StepResult::success("hello");
        result.session_id = Some("sess-9".to_string());

        state.record("a", result);

        assert_eq!(state.step_outputs.get("a").map(String::as_str), Some("hello"));
        assert_eq!(state.session_ids.get("a").map(String::as_str), Some("sess-9"));
        assert!(state.step_results.get("a").unwrap().is_success());
    }

    #[test]
    fn test_state_round_trips_through_checkpoint_json() {
        let steps: Vec<WorkflowStep> = serde_json::from_value(json!([
            {"type": "task", "id": "a", "role": "dev", "task": "t"},
            {"type": "human", "id": "h", "prompt": "ok?", "deps": ["a"]}
        ]))
        .unwrap();
        let mut state = WorkflowState::new("thread-1", Some("proj".to_string()), steps);
        state.record("a", StepResult::success("done"));
        state.status = WorkflowStatus::Completed;

        let value = serde_json::to_value(&state).unwrap();
        let back: WorkflowState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
