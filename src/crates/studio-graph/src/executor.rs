//! Checkpointed workflow execution
//!
//! [`WorkflowExecutor`] drives a validated step list to completion:
//!
//! - **Dependency scheduling** - a step becomes eligible only when every id
//!   in its `deps` holds a `success` result; when a step fails, all
//!   transitive dependants are marked `skipped` without executing.
//! - **Node execution** - one node type per step kind; parallel children run
//!   under structured concurrency against snapshotted contexts, loop
//!   iterations run sequentially with the loop variable substituted, human
//!   gates suspend on the [`ApprovalGate`].
//! - **Checkpointing** - the full [`WorkflowState`] is written through the
//!   [`CheckpointSaver`] after every node completes or fails, so a crashed
//!   run resumes from its last completed node.
//! - **Cancellation** - `cancel(thread_id)` flips a watch channel observed
//!   between nodes and inside every in-flight node; the run checkpoints a
//!   final `cancelled` status and emits `workflow_failed` with reason
//!   `cancelled`.
//!
//! Events stream through [`WorkflowEvents`]; every node completion also
//! emits a `graph_update` carrying the full [`WorkflowGraph`].

use crate::condition::Condition;
use crate::error::{GraphError, Result};
use crate::events::{WorkflowEvent, WorkflowEvents};
use crate::graph::WorkflowGraph;
use crate::runner::{ApprovalGate, ApprovalRequest, ApprovalDecision, BindingResolver, StepRunner, WorkflowContext};
use crate::step::{
    HumanStep, LoopStep, ParallelStep, StepResult, StepStatus, TaskStep, WorkflowState, WorkflowStatus,
    WorkflowStep, ConditionalStep,
};
use crate::template;
use crate::validation;
use futures::future::{join_all, BoxFuture};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use studio_checkpoint::{Checkpoint, CheckpointSaver};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Graph executor with durable checkpointing and real-time events
pub struct WorkflowExecutor {
    saver: Arc<dyn CheckpointSaver>,
    runner: Arc<dyn StepRunner>,
    gate: Arc<dyn ApprovalGate>,
    bindings: Arc<dyn BindingResolver>,
    events: WorkflowEvents,
    cancellations: StdMutex<HashMap<String, watch::Sender<bool>>>,
}

impl WorkflowExecutor {
    pub fn new(
        saver: Arc<dyn CheckpointSaver>,
        runner: Arc<dyn StepRunner>,
        gate: Arc<dyn ApprovalGate>,
        bindings: Arc<dyn BindingResolver>,
    ) -> Self {
        Self {
            saver,
            runner,
            gate,
            bindings,
            events: WorkflowEvents::default(),
            cancellations: StdMutex::new(HashMap::new()),
        }
    }

    /// Event hub for this executor; subscribe before invoking to see
    /// everything a run emits
    pub fn events(&self) -> &WorkflowEvents {
        &self.events
    }

    /// Validate and execute a workflow from a clean state
    pub async fn execute(
        &self,
        steps: Vec<WorkflowStep>,
        thread_id: &str,
        project_id: Option<String>,
    ) -> Result<WorkflowState> {
        let report = validation::validate(&steps, project_id.as_deref(), self.bindings.as_ref()).await?;
        for warning in &report.warnings {
            warn!(thread_id = %thread_id, "{warning}");
        }

        let state = WorkflowState::new(thread_id, project_id, steps);
        self.run(state).await
    }

    /// Re-invoke a thread from its latest checkpoint
    ///
    /// Nodes that had not completed restart from scratch; completed nodes
    /// keep their recorded results.
    pub async fn resume_workflow(
        &self,
        thread_id: &str,
        steps: Vec<WorkflowStep>,
        project_id: Option<String>,
    ) -> Result<WorkflowState> {
        let checkpoint = self
            .saver
            .latest(thread_id)
            .await?
            .ok_or_else(|| GraphError::Execution(format!("no checkpoints for thread '{thread_id}'")))?;
        self.resume_from(checkpoint, steps, project_id).await
    }

    /// Restart a thread from an earlier checkpoint, discarding later state
    pub async fn resume_from_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: u64,
        steps: Vec<WorkflowStep>,
        project_id: Option<String>,
    ) -> Result<WorkflowState> {
        let checkpoint = self.saver.get(thread_id, checkpoint_id).await?.ok_or_else(|| {
            GraphError::Execution(format!("checkpoint {checkpoint_id} not found for thread '{thread_id}'"))
        })?;
        self.resume_from(checkpoint, steps, project_id).await
    }

    async fn resume_from(
        &self,
        checkpoint: Checkpoint,
        steps: Vec<WorkflowStep>,
        project_id: Option<String>,
    ) -> Result<WorkflowState> {
        let mut state: WorkflowState = serde_json::from_value(checkpoint.state)?;

        if !structurally_compatible(&steps, &state.steps) {
            return Err(GraphError::Execution("incompatible workflow definition".to_string()));
        }

        state.steps = steps;
        state.status = WorkflowStatus::Running;
        if project_id.is_some() {
            state.project_id = project_id;
        }

        info!(thread_id = %state.thread_id, checkpoint_id = checkpoint.checkpoint_id, "Resuming workflow");
        self.run(state).await
    }

    /// Latest checkpointed state for a thread
    pub async fn get_current_state(&self, thread_id: &str) -> Result<Option<WorkflowState>> {
        match self.saver.latest(thread_id).await? {
            Some(checkpoint) => Ok(Some(serde_json::from_value(checkpoint.state)?)),
            None => Ok(None),
        }
    }

    /// Full checkpoint history for a thread, oldest first
    pub async fn get_state_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self.saver.history(thread_id).await?)
    }

    /// Point-in-time state read
    pub async fn get_checkpoint(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<WorkflowState>> {
        match self.saver.get(thread_id, checkpoint_id).await? {
            Some(checkpoint) => Ok(Some(serde_json::from_value(checkpoint.state)?)),
            None => Ok(None),
        }
    }

    /// Signal a running thread to stop
    ///
    /// Returns false when no run with this thread id is in flight.
    pub fn cancel(&self, thread_id: &str) -> bool {
        let cancellations = self.cancellations.lock().expect("cancellation map lock poisoned");
        match cancellations.get(thread_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState> {
        let thread_id = state.thread_id.clone();
        let (tx, mut rx) = watch::channel(false);
        self.cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .insert(thread_id.clone(), tx);

        let outcome = self.drive(&mut state, &mut rx).await;

        self.cancellations
            .lock()
            .expect("cancellation map lock poisoned")
            .remove(&thread_id);

        match outcome {
            Ok(()) => {
                let failed = state.step_results.values().filter(|r| r.status == StepStatus::Failed).count();
                if failed > 0 {
                    state.status = WorkflowStatus::Failed;
                    self.checkpoint(&state).await?;
                    self.events.emit(WorkflowEvent::WorkflowFailed {
                        thread_id,
                        reason: format!("{failed} step(s) failed"),
                    });
                } else {
                    state.status = WorkflowStatus::Completed;
                    self.checkpoint(&state).await?;
                    self.events.emit(WorkflowEvent::WorkflowComplete { thread_id });
                }
                Ok(state)
            }
            Err(GraphError::Cancelled(_)) => {
                state.status = WorkflowStatus::Cancelled;
                self.checkpoint(&state).await?;
                self.events.emit(WorkflowEvent::WorkflowFailed {
                    thread_id,
                    reason: "cancelled".to_string(),
                });
                Ok(state)
            }
            Err(e) => Err(e),
        }
    }

    /// Dependency scheduling loop over top-level steps
    async fn drive(&self, state: &mut WorkflowState, cancel: &mut watch::Receiver<bool>) -> Result<()> {
        // Steps referenced by containers or branches only run inside their
        // parent node, never from the scheduler.
        let children: HashSet<String> = state
            .steps
            .iter()
            .flat_map(|s| s.referenced_steps().into_iter().map(str::to_string))
            .collect();

        loop {
            if *cancel.borrow() {
                return Err(GraphError::Cancelled(state.thread_id.clone()));
            }

            self.skip_unreachable(state, &children).await?;

            let next = state
                .steps
                .iter()
                .find(|s| {
                    !children.contains(s.id())
                        && !state.step_results.contains_key(s.id())
                        && s.deps()
                            .iter()
                            .all(|d| state.step_results.get(d).map(StepResult::is_success).unwrap_or(false))
                })
                .map(|s| s.id().to_string());

            let Some(step_id) = next else { break };
            debug!(thread_id = %state.thread_id, step_id = %step_id, "Executing step");
            self.execute_node(&step_id, state, cancel).await?;
        }

        Ok(())
    }

    /// Mark every step whose dependencies can no longer succeed as skipped
    async fn skip_unreachable(&self, state: &mut WorkflowState, children: &HashSet<String>) -> Result<()> {
        let mut marked_any = false;
        loop {
            let doomed: Vec<String> = state
                .steps
                .iter()
                .filter(|s| !children.contains(s.id()) && !state.step_results.contains_key(s.id()))
                .filter(|s| {
                    s.deps().iter().any(|d| {
                        state
                            .step_results
                            .get(d)
                            .map(|r| r.status != StepStatus::Success)
                            .unwrap_or(false)
                    })
                })
                .map(|s| s.id().to_string())
                .collect();

            if doomed.is_empty() {
                break;
            }
            for step_id in doomed {
                state.record(&step_id, StepResult::skipped("skipped: dependency did not succeed"));
                marked_any = true;
            }
        }

        if marked_any {
            self.checkpoint(state).await?;
        }
        Ok(())
    }

    /// Execute one node of any type, recording its result(s)
    ///
    /// Boxed for recursion: conditional nodes execute their branch target
    /// through this same entry point.
    fn execute_node<'a>(
        &'a self,
        step_id: &'a str,
        state: &'a mut WorkflowState,
        cancel: &'a mut watch::Receiver<bool>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let step = state
                .step(step_id)
                .cloned()
                .ok_or_else(|| GraphError::Validation(format!("unknown step '{step_id}'")))?;

            match step {
                WorkflowStep::Task(task) => self.run_task_node(&task, state, cancel).await,
                WorkflowStep::Parallel(parallel) => self.run_parallel_node(&parallel, state, cancel).await,
                WorkflowStep::Loop(looped) => self.run_loop_node(&looped, state, cancel).await,
                WorkflowStep::Conditional(cond) => self.run_conditional_node(&cond, state, cancel).await,
                WorkflowStep::Human(human) => self.run_human_node(&human, state, cancel).await,
            }
        })
    }

    async fn run_task_node(
        &self,
        task: &TaskStep,
        state: &mut WorkflowState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        self.events.emit(WorkflowEvent::StepStart {
            thread_id: state.thread_id.clone(),
            step_id: task.id.clone(),
        });

        let prompt = template::substitute(&task.task, state);
        let ctx = WorkflowContext::from_state(state);
        let result = self.run_single_task(task, prompt, ctx, cancel.clone()).await?;

        self.emit_step_terminal(&state.thread_id, &task.id, &result);
        state.record(&task.id, result);
        self.after_node(state).await
    }

    /// Run one task against the runner, racing the cancel signal
    ///
    /// Returns `Err` only for cancellation; executor failures become a
    /// failed [`StepResult`].
    async fn run_single_task(
        &self,
        task: &TaskStep,
        prompt: String,
        ctx: WorkflowContext,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<StepResult> {
        let thread_id = ctx.thread_id.clone();
        let started = Instant::now();

        let outcome = tokio::select! {
            outcome = self.runner.run_task(task, &prompt, &ctx) => outcome,
            _ = cancel.wait_for(|c| *c) => return Err(GraphError::Cancelled(thread_id)),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(match outcome {
            Ok(output) => StepResult {
                status: StepStatus::Success,
                response: output.response,
                session_id: output.session_id,
                duration_ms,
            },
            Err(GraphError::Cancelled(id)) => return Err(GraphError::Cancelled(id)),
            Err(e) => StepResult {
                status: StepStatus::Failed,
                response: e.to_string(),
                session_id: None,
                duration_ms,
            },
        })
    }

    async fn run_parallel_node(
        &self,
        parallel: &ParallelStep,
        state: &mut WorkflowState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let thread_id = state.thread_id.clone();
        self.events.emit(WorkflowEvent::StepStart {
            thread_id: thread_id.clone(),
            step_id: parallel.id.clone(),
        });
        let started = Instant::now();

        // Snapshot contexts before any child runs; children see the state
        // as of the parallel node's start, not each other's writes.
        let mut tasks = Vec::with_capacity(parallel.parallel_steps.len());
        for child_id in &parallel.parallel_steps {
            match state.step(child_id).cloned() {
                Some(WorkflowStep::Task(task)) => {
                    let prompt = template::substitute(&task.task, state);
                    tasks.push((task, prompt));
                }
                _ => {
                    return Err(GraphError::Validation(format!(
                        "parallel step '{}' references non-task step '{child_id}'",
                        parallel.id
                    )))
                }
            }
        }

        let ctx = WorkflowContext::from_state(state);
        let futures = tasks.into_iter().map(|(task, prompt)| {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            let thread_id = thread_id.clone();
            async move {
                self.events.emit(WorkflowEvent::StepStart {
                    thread_id: thread_id.clone(),
                    step_id: task.id.clone(),
                });
                let result = self.run_single_task(&task, prompt, ctx, cancel).await?;
                Ok::<_, GraphError>((task.id, result))
            }
        });

        let outcomes = join_all(futures).await;

        let mut succeeded = 0usize;
        for outcome in outcomes {
            let (child_id, result) = outcome?;
            if result.is_success() {
                succeeded += 1;
            }
            self.emit_step_terminal(&thread_id, &child_id, &result);
            state.record(&child_id, result);
            self.after_node(state).await?;
        }

        let total = parallel.parallel_steps.len();
        let aggregate = StepResult {
            status: if succeeded == total { StepStatus::Success } else { StepStatus::Failed },
            response: format!("{succeeded}/{total} parallel steps succeeded"),
            session_id: None,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.emit_step_terminal(&thread_id, &parallel.id, &aggregate);
        state.record(&parallel.id, aggregate);
        self.after_node(state).await
    }

    async fn run_loop_node(
        &self,
        looped: &LoopStep,
        state: &mut WorkflowState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let thread_id = state.thread_id.clone();
        self.events.emit(WorkflowEvent::StepStart {
            thread_id: thread_id.clone(),
            step_id: looped.id.clone(),
        });
        let started = Instant::now();

        let iterations = looped.max_iterations.min(looped.items.len());
        let mut completed = 0usize;
        let mut failed = false;

        'iterations: for item in looped.items.iter().take(iterations) {
            for step_id in &looped.loop_steps {
                let Some(WorkflowStep::Task(task)) = state.step(step_id).cloned() else {
                    return Err(GraphError::Validation(format!(
                        "loop step '{}' references non-task step '{step_id}'",
                        looped.id
                    )));
                };

                let iteration_id = template::iteration_step_id(step_id, &looped.loop_var, item);
                let task_text = template::substitute_loop_var(&task.task, &looped.loop_var, item);
                let prompt = template::substitute(&task_text, state);

                self.events.emit(WorkflowEvent::StepStart {
                    thread_id: thread_id.clone(),
                    step_id: iteration_id.clone(),
                });

                let ctx = WorkflowContext::from_state(state);
                let result = self.run_single_task(&task, prompt, ctx, cancel.clone()).await?;
                let ok = result.is_success();

                self.emit_step_terminal(&thread_id, &iteration_id, &result);
                state.record(&iteration_id, result);
                self.after_node(state).await?;

                if !ok {
                    failed = true;
                    break 'iterations;
                }
            }
            completed += 1;
        }

        let aggregate = StepResult {
            status: if failed { StepStatus::Failed } else { StepStatus::Success },
            response: format!("{completed}/{iterations} iterations succeeded"),
            session_id: None,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.emit_step_terminal(&thread_id, &looped.id, &aggregate);
        state.record(&looped.id, aggregate);
        self.after_node(state).await
    }

    async fn run_conditional_node(
        &self,
        cond: &ConditionalStep,
        state: &mut WorkflowState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let thread_id = state.thread_id.clone();
        self.events.emit(WorkflowEvent::StepStart {
            thread_id: thread_id.clone(),
            step_id: cond.id.clone(),
        });

        let verdict = match Condition::evaluate(&cond.condition, state) {
            Ok(verdict) => verdict,
            Err(e) => {
                let result = StepResult::failed(format!("condition evaluation failed: {e}"));
                self.emit_step_terminal(&thread_id, &cond.id, &result);
                state.record(&cond.id, result);
                return self.after_node(state).await;
            }
        };

        let (branch_name, target) = if verdict {
            ("trueBranch", cond.true_branch.clone())
        } else {
            ("falseBranch", cond.false_branch.clone())
        };

        let result = match target {
            None => StepResult::success(format!("skipped ({branch_name})")),
            Some(target_id) => {
                self.execute_node(&target_id, state, cancel).await?;
                let branch_ok = state
                    .step_results
                    .get(&target_id)
                    .map(StepResult::is_success)
                    .unwrap_or(false);
                if branch_ok {
                    StepResult::success(format!("took {branch_name} ({target_id})"))
                } else {
                    StepResult::failed(format!("branch {target_id} failed"))
                }
            }
        };

        self.emit_step_terminal(&thread_id, &cond.id, &result);
        state.record(&cond.id, result);
        self.after_node(state).await
    }

    async fn run_human_node(
        &self,
        human: &HumanStep,
        state: &mut WorkflowState,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let thread_id = state.thread_id.clone();
        self.events.emit(WorkflowEvent::StepStart {
            thread_id: thread_id.clone(),
            step_id: human.id.clone(),
        });
        self.events.emit(WorkflowEvent::WorkflowPaused {
            thread_id: thread_id.clone(),
            step_id: human.id.clone(),
        });

        let request = ApprovalRequest {
            thread_id: thread_id.clone(),
            step_id: human.id.clone(),
            project_id: state.project_id.clone(),
            workflow_name: None,
            prompt: template::substitute(&human.prompt, state),
            interaction_type: human.interaction_type,
            timeout_seconds: human.timeout_seconds,
            timeout_behavior: human.timeout_behavior,
            risk_level: human.risk_level,
            context_data: serde_json::to_value(&state.step_results)?,
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            outcome = self.gate.request_approval(request) => outcome,
            _ = cancel.wait_for(|c| *c) => return Err(GraphError::Cancelled(thread_id)),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(ApprovalDecision::Approved) => StepResult::success("Human approval granted"),
            Ok(ApprovalDecision::Rejected) => StepResult::failed("Human approval rejected"),
            Err(GraphError::Cancelled(id)) => return Err(GraphError::Cancelled(id)),
            Err(e) => StepResult::failed(e.to_string()),
        };
        result.duration_ms = duration_ms;

        self.emit_step_terminal(&thread_id, &human.id, &result);
        state.record(&human.id, result);
        self.after_node(state).await
    }

    fn emit_step_terminal(&self, thread_id: &str, step_id: &str, result: &StepResult) {
        match result.status {
            StepStatus::Failed => self.events.emit(WorkflowEvent::StepFailed {
                thread_id: thread_id.to_string(),
                step_id: step_id.to_string(),
                error: result.response.clone(),
            }),
            _ => self.events.emit(WorkflowEvent::StepComplete {
                thread_id: thread_id.to_string(),
                step_id: step_id.to_string(),
                status: result.status,
                session_id: result.session_id.clone(),
            }),
        }
    }

    /// Persist the full state and publish the refreshed graph view
    async fn after_node(&self, state: &WorkflowState) -> Result<()> {
        self.checkpoint(state).await?;
        self.events.emit(WorkflowEvent::GraphUpdate {
            thread_id: state.thread_id.clone(),
            graph: WorkflowGraph::from_state(state),
        });
        Ok(())
    }

    async fn checkpoint(&self, state: &WorkflowState) -> Result<()> {
        self.saver.put(&state.thread_id, serde_json::to_value(state)?).await?;
        Ok(())
    }
}

/// Same step ids, same types, same dependency and reference edges
fn structurally_compatible(steps: &[WorkflowStep], prior: &[WorkflowStep]) -> bool {
    fn shape(steps: &[WorkflowStep]) -> Vec<(String, String, Vec<String>, Vec<String>)> {
        let mut shapes: Vec<_> = steps
            .iter()
            .map(|s| {
                (
                    s.id().to_string(),
                    s.step_type().to_string(),
                    s.deps().to_vec(),
                    s.referenced_steps().iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect();
        shapes.sort();
        shapes
    }

    steps.len() == prior.len() && shape(steps) == shape(prior)
}
