//! End-to-end workflow execution tests
//!
//! Drives the executor through complete runs with a scripted step runner
//! and approval gates: linear chains, parallel fan-out with failures,
//! loops, conditional routing, human gates, dependency skipping,
//! checkpoint resume, and cancellation.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use studio_checkpoint::InMemoryCheckpointSaver;
use studio_graph::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprovalGate, GraphError,
    PermissiveBindings, StepRunOutput, StepRunner, StepStatus, TaskStep, WorkflowContext,
    WorkflowEvent, WorkflowExecutor, WorkflowStatus, WorkflowStep,
};

/// Step runner driven by a per-step script
///
/// Unscripted steps echo their substituted prompt, which is exactly what
/// template tests need to observe.
#[derive(Default)]
struct ScriptedRunner {
    responses: HashMap<String, String>,
    failures: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn echo() -> Self {
        Self::default()
    }

    fn with_response(mut self, step_id: &str, response: &str) -> Self {
        self.responses.insert(step_id.to_string(), response.to_string());
        self
    }

    fn with_failure(mut self, step_id: &str) -> Self {
        self.failures.insert(step_id.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run_task(
        &self,
        step: &TaskStep,
        prompt: &str,
        _ctx: &WorkflowContext,
    ) -> studio_graph::Result<StepRunOutput> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(step.id.clone());

        if self.failures.contains(&step.id) {
            return Err(GraphError::step_execution(&step.id, "simulated failure"));
        }

        let response = self
            .responses
            .get(&step.id)
            .cloned()
            .unwrap_or_else(|| prompt.to_string());
        Ok(StepRunOutput {
            response,
            session_id: Some(format!("sess-{}", step.id)),
        })
    }
}

/// Gate that always rejects
struct RejectingGate;

#[async_trait]
impl ApprovalGate for RejectingGate {
    async fn request_approval(&self, _request: ApprovalRequest) -> studio_graph::Result<ApprovalDecision> {
        Ok(ApprovalDecision::Rejected)
    }
}

/// Gate whose finite budget always expires with `fail` behaviour
struct ExpiringGate;

#[async_trait]
impl ApprovalGate for ExpiringGate {
    async fn request_approval(&self, request: ApprovalRequest) -> studio_graph::Result<ApprovalDecision> {
        Err(GraphError::Timeout {
            operation: format!("approval for step '{}'", request.step_id),
            duration_secs: request.timeout_seconds,
        })
    }
}

fn steps(value: serde_json::Value) -> Vec<WorkflowStep> {
    serde_json::from_value(value).unwrap()
}

fn executor_with(runner: ScriptedRunner, gate: Arc<dyn ApprovalGate>) -> Arc<WorkflowExecutor> {
    Arc::new(WorkflowExecutor::new(
        Arc::new(InMemoryCheckpointSaver::new()),
        Arc::new(runner),
        gate,
        Arc::new(PermissiveBindings),
    ))
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_linear_two_step_workflow() {
    let runner = ScriptedRunner::echo().with_response("a", "hello");
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));
    let mut rx = executor.events().subscribe();

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "a", "role": "developer", "task": "say hello"},
                {"type": "task", "id": "b", "role": "developer", "task": "say {a.output}", "deps": ["a"]}
            ])),
            "thread-s1",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.step_results["a"].is_success());
    assert!(state.step_results["b"].is_success());
    assert_eq!(state.step_outputs["b"], "say hello");

    let completions: Vec<String> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::StepComplete { step_id, .. } => Some(step_id),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_parallel_of_three_with_one_failure() {
    let runner = ScriptedRunner::echo().with_failure("y");
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));
    let mut rx = executor.events().subscribe();

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "x", "role": "developer", "task": "one"},
                {"type": "task", "id": "y", "role": "developer", "task": "two"},
                {"type": "task", "id": "z", "role": "developer", "task": "three"},
                {"type": "parallel", "id": "p", "parallelSteps": ["x", "y", "z"]},
                {"type": "task", "id": "after", "role": "developer", "task": "never", "deps": ["p"]}
            ])),
            "thread-s2",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.step_results["p"].status, StepStatus::Failed);
    assert!(state.step_results["x"].is_success());
    assert_eq!(state.step_results["y"].status, StepStatus::Failed);
    assert!(state.step_results["z"].is_success());

    // Dependants of the failed parallel never execute
    assert_eq!(state.step_results["after"].status, StepStatus::Skipped);

    let events = drain_events(&mut rx);
    let child_terminal = events
        .iter()
        .filter(|e| {
            matches!(e,
                WorkflowEvent::StepComplete { step_id, .. } | WorkflowEvent::StepFailed { step_id, .. }
                    if ["x", "y", "z"].contains(&step_id.as_str()))
        })
        .count();
    assert_eq!(child_terminal, 3);
    assert!(events.iter().any(|e| matches!(e,
        WorkflowEvent::StepFailed { step_id, .. } if step_id == "p")));
}

#[tokio::test]
async fn test_loop_with_two_items() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "p", "role": "developer", "task": "process {item}"},
                {"type": "loop", "id": "l", "items": ["alpha", "beta"], "loopVar": "item",
                 "maxIterations": 10, "loopSteps": ["p"]}
            ])),
            "thread-s3",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.step_results["p_item_alpha"].is_success());
    assert!(state.step_results["p_item_beta"].is_success());
    assert!(state.step_results["l"].is_success());
    assert_eq!(state.step_outputs["p_item_alpha"], "process alpha");
    assert_eq!(state.step_outputs["p_item_beta"], "process beta");
}

#[tokio::test]
async fn test_loop_respects_max_iterations() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "p", "role": "developer", "task": "process {item}"},
                {"type": "loop", "id": "l", "items": ["a", "b", "c"], "loopVar": "item",
                 "maxIterations": 2, "loopSteps": ["p"]}
            ])),
            "thread-loop-max",
            None,
        )
        .await
        .unwrap();

    assert!(state.step_results.contains_key("p_item_a"));
    assert!(state.step_results.contains_key("p_item_b"));
    assert!(!state.step_results.contains_key("p_item_c"));
}

#[tokio::test]
async fn test_conditional_takes_true_branch() {
    let runner = ScriptedRunner::echo().with_response("a", "yes, proceed");
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "a", "role": "developer", "task": "decide"},
                {"type": "task", "id": "t", "role": "developer", "task": "true path"},
                {"type": "task", "id": "f", "role": "developer", "task": "false path"},
                {"type": "conditional", "id": "c", "deps": ["a"],
                 "condition": {"combinator": "AND",
                               "rules": [{"field": "a.output", "operator": "contains", "value": "yes"}]},
                 "trueBranch": "t", "falseBranch": "f"}
            ])),
            "thread-s4",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.step_results["t"].is_success());
    assert!(!state.step_results.contains_key("f"));
    assert!(state.step_results["c"].response.contains("trueBranch"));
}

#[tokio::test]
async fn test_conditional_missing_branch_is_terminal_skip() {
    let runner = ScriptedRunner::echo().with_response("a", "no");
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "a", "role": "developer", "task": "decide"},
                {"type": "task", "id": "t", "role": "developer", "task": "true path"},
                {"type": "conditional", "id": "c", "deps": ["a"],
                 "condition": {"version": "1.0", "expression": "{a.output} == \"yes\""},
                 "trueBranch": "t"}
            ])),
            "thread-cond-skip",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.step_results["c"].is_success());
    assert_eq!(state.step_results["c"].response, "skipped (falseBranch)");
    assert!(!state.step_results.contains_key("t"));
}

#[tokio::test]
async fn test_human_gate_auto_approves_in_mock_mode() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(
        runner,
        Arc::new(AutoApprovalGate::new(Duration::from_millis(20))),
    );
    let mut rx = executor.events().subscribe();

    let state = executor
        .execute(
            steps(json!([
                {"type": "human", "id": "h", "prompt": "deploy?", "interactionType": "approval",
                 "timeoutSeconds": 2, "timeoutBehavior": "auto-approve"}
            ])),
            "thread-s5",
            None,
        )
        .await
        .unwrap();

    assert!(state.step_results["h"].is_success());
    assert_eq!(state.step_results["h"].response, "Human approval granted");

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(e,
        WorkflowEvent::WorkflowPaused { step_id, .. } if step_id == "h")));
}

#[tokio::test]
async fn test_human_gate_rejection_fails_step() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(runner, Arc::new(RejectingGate));

    let state = executor
        .execute(
            steps(json!([
                {"type": "human", "id": "h", "prompt": "deploy?"},
                {"type": "task", "id": "after", "role": "developer", "task": "never", "deps": ["h"]}
            ])),
            "thread-reject",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.step_results["h"].status, StepStatus::Failed);
    assert_eq!(state.step_results["h"].response, "Human approval rejected");
    assert_eq!(state.step_results["after"].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_human_gate_timeout_fails_step() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(runner, Arc::new(ExpiringGate));

    let state = executor
        .execute(
            steps(json!([
                {"type": "human", "id": "h", "prompt": "deploy?", "timeoutSeconds": 1,
                 "timeoutBehavior": "fail"}
            ])),
            "thread-expire",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.step_results["h"].status, StepStatus::Failed);
    assert!(state.step_results["h"].response.contains("timed out"));
}

#[tokio::test]
async fn test_failure_skips_transitive_dependants() {
    let runner = ScriptedRunner::echo().with_failure("a");
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let state = executor
        .execute(
            steps(json!([
                {"type": "task", "id": "a", "role": "developer", "task": "boom"},
                {"type": "task", "id": "b", "role": "developer", "task": "t", "deps": ["a"]},
                {"type": "task", "id": "c", "role": "developer", "task": "t", "deps": ["b"]},
                {"type": "task", "id": "d", "role": "developer", "task": "independent"}
            ])),
            "thread-skip",
            None,
        )
        .await
        .unwrap();

    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.step_results["a"].status, StepStatus::Failed);
    assert_eq!(state.step_results["b"].status, StepStatus::Skipped);
    assert_eq!(state.step_results["c"].status, StepStatus::Skipped);
    // Unrelated branches still run
    assert!(state.step_results["d"].is_success());

    // Every non-skipped step's dependencies all succeeded
    for step in &state.steps {
        let result = &state.step_results[step.id()];
        if result.status != StepStatus::Skipped {
            for dep in step.deps() {
                assert!(state.step_results[dep].is_success());
            }
        }
    }
}

#[tokio::test]
async fn test_resume_after_completion_is_stable() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let runner = Arc::new(ScriptedRunner::echo().with_response("a", "hello"));
    let executor = WorkflowExecutor::new(
        saver,
        runner.clone(),
        Arc::new(AutoApprovalGate::default()),
        Arc::new(PermissiveBindings),
    );

    let workflow = steps(json!([
        {"type": "task", "id": "a", "role": "developer", "task": "say hello"},
        {"type": "task", "id": "b", "role": "developer", "task": "say {a.output}", "deps": ["a"]}
    ]));

    let first = executor.execute(workflow.clone(), "thread-resume", None).await.unwrap();
    let calls_after_first = runner.calls().len();

    // Resuming a completed run re-executes nothing and reproduces the
    // exact same results.
    let resumed = executor.resume_workflow("thread-resume", workflow, None).await.unwrap();

    assert_eq!(resumed.step_results, first.step_results);
    assert_eq!(resumed.step_outputs, first.step_outputs);
    assert_eq!(runner.calls().len(), calls_after_first);
}

#[tokio::test]
async fn test_resume_from_checkpoint_re_runs_later_steps() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let runner = Arc::new(ScriptedRunner::echo().with_response("a", "hello"));
    let executor = WorkflowExecutor::new(
        saver.clone(),
        runner.clone(),
        Arc::new(AutoApprovalGate::default()),
        Arc::new(PermissiveBindings),
    );

    let workflow = steps(json!([
        {"type": "task", "id": "a", "role": "developer", "task": "say hello"},
        {"type": "task", "id": "b", "role": "developer", "task": "say {a.output}", "deps": ["a"]}
    ]));

    executor.execute(workflow.clone(), "thread-tt", None).await.unwrap();

    // First checkpoint holds only step a's result
    let history = executor.get_state_history("thread-tt").await.unwrap();
    let first_checkpoint = history.first().unwrap().checkpoint_id;

    let replayed = executor
        .resume_from_checkpoint("thread-tt", first_checkpoint, workflow, None)
        .await
        .unwrap();

    assert_eq!(replayed.status, WorkflowStatus::Completed);
    assert_eq!(replayed.step_outputs["b"], "say hello");
    // Step b ran twice in total: once per invocation
    assert_eq!(runner.calls().iter().filter(|c| c.as_str() == "b").count(), 2);
}

#[tokio::test]
async fn test_resume_rejects_incompatible_definition() {
    let runner = ScriptedRunner::echo();
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));

    let workflow = steps(json!([
        {"type": "task", "id": "a", "role": "developer", "task": "t"}
    ]));
    executor.execute(workflow, "thread-incompat", None).await.unwrap();

    let changed = steps(json!([
        {"type": "task", "id": "a", "role": "developer", "task": "t"},
        {"type": "task", "id": "extra", "role": "developer", "task": "t"}
    ]));
    let err = executor
        .resume_workflow("thread-incompat", changed, None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("incompatible workflow definition"));
}

#[tokio::test]
async fn test_cancellation_stops_the_run() {
    let runner = ScriptedRunner::echo().with_delay(Duration::from_secs(30));
    let executor = executor_with(runner, Arc::new(AutoApprovalGate::default()));
    let mut rx = executor.events().subscribe();

    let workflow = steps(json!([
        {"type": "task", "id": "a", "role": "developer", "task": "slow"},
        {"type": "task", "id": "b", "role": "developer", "task": "next", "deps": ["a"]}
    ]));

    let handle = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(workflow, "thread-cancel", None).await })
    };

    // Let the first step get in flight, then abort
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(executor.cancel("thread-cancel"));

    let state = handle.await.unwrap().unwrap();
    assert_eq!(state.status, WorkflowStatus::Cancelled);

    let events = drain_events(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, WorkflowEvent::StepComplete { .. })));
    assert!(events.iter().any(|e| matches!(e,
        WorkflowEvent::WorkflowFailed { reason, .. } if reason == "cancelled")));

    // The cancelled status survives in the latest checkpoint
    let persisted = executor.get_current_state("thread-cancel").await.unwrap().unwrap();
    assert_eq!(persisted.status, WorkflowStatus::Cancelled);

    // Nothing left to cancel
    assert!(!executor.cancel("thread-cancel"));
}

#[tokio::test]
async fn test_checkpoint_written_after_every_node() {
    let saver = Arc::new(InMemoryCheckpointSaver::new());
    let executor = WorkflowExecutor::new(
        saver.clone(),
        Arc::new(ScriptedRunner::echo()),
        Arc::new(AutoApprovalGate::default()),
        Arc::new(PermissiveBindings),
    );

    executor
        .execute(
            steps(json!([
                {"type": "task", "id": "a", "role": "developer", "task": "one"},
                {"type": "task", "id": "b", "role": "developer", "task": "two", "deps": ["a"]}
            ])),
            "thread-ckpt",
            None,
        )
        .await
        .unwrap();

    // One checkpoint per node plus the final status write
    let history = executor.get_state_history("thread-ckpt").await.unwrap();
    assert_eq!(history.len(), 3);
}
