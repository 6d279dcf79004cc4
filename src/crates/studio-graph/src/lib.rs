//! # studio-graph - Durable Multi-Step Workflow Execution
//!
//! The workflow orchestrator core of claude-studio: builds an executable
//! graph from a list of workflow steps, executes it with durable
//! checkpointing, and emits real-time events.
//!
//! ## Overview
//!
//! - **Typed step model** - [`WorkflowStep`] is a tagged union of
//!   task / parallel / loop / conditional / human steps
//! - **Fail-fast validation** - bindings, dependencies, cycle detection
//!   with path reporting, template reference checks; nothing runs on a
//!   validation failure
//! - **Dependency scheduling** - steps become eligible when all their
//!   `deps` are terminal-success; failures skip transitive dependants
//! - **Checkpoint/resume** - full state persisted through
//!   [`studio_checkpoint`] after every node; resume from the latest or any
//!   earlier checkpoint
//! - **Human-in-the-loop** - human steps suspend on an [`ApprovalGate`]
//!   until a decision arrives or the timeout behaviour resolves them
//! - **Cancellation** - a per-thread signal observed between nodes and
//!   inside every in-flight node
//! - **Events** - `step_start`, `step_complete`, `step_failed`,
//!   `workflow_complete`, `workflow_failed`, `workflow_paused`, and
//!   `graph_update` with a full [`WorkflowGraph`] snapshot
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use studio_graph::{WorkflowExecutor, WorkflowStep};
//! use studio_checkpoint::InMemoryCheckpointSaver;
//! use std::sync::Arc;
//!
//! let steps: Vec<WorkflowStep> = serde_json::from_str(r#"[
//!     {"type": "task", "id": "a", "role": "developer", "task": "say hello"},
//!     {"type": "task", "id": "b", "role": "developer",
//!      "task": "say {a.output}", "deps": ["a"]}
//! ]"#)?;
//!
//! let executor = WorkflowExecutor::new(
//!     Arc::new(InMemoryCheckpointSaver::new()),
//!     runner,     // Arc<dyn StepRunner>    - executes task prompts
//!     gate,       // Arc<dyn ApprovalGate>  - resolves human steps
//!     bindings,   // Arc<dyn BindingResolver> - role/agent lookups
//! );
//!
//! let state = executor.execute(steps, "thread-1", None).await?;
//! assert_eq!(state.step_outputs["b"], "say hello");
//! ```
//!
//! ## Module Organization
//!
//! - [`step`] - step union, results, run state
//! - [`condition`] - structured and legacy condition evaluation
//! - [`template`] - `{stepId.field}` and loop-variable substitution
//! - [`validation`] - fail-fast checks and cycle detection
//! - [`executor`] - the scheduling/execution engine
//! - [`runner`] - the [`StepRunner`] / [`ApprovalGate`] /
//!   [`BindingResolver`] seams
//! - [`events`] - the `workflow:update` event family
//! - [`graph`] - the [`WorkflowGraph`] projection for observers

pub mod condition;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod runner;
pub mod step;
pub mod template;
pub mod validation;

pub use condition::{Combinator, Condition, ConditionGroup, ConditionRule, LegacyCondition, Operator};
pub use error::{GraphError, Result};
pub use events::{WorkflowEvent, WorkflowEvents};
pub use executor::WorkflowExecutor;
pub use graph::{EdgeKind, GraphEdge, GraphNode, WorkflowGraph};
pub use runner::{
    ApprovalDecision, ApprovalGate, ApprovalRequest, AutoApprovalGate, BindingResolver,
    PermissiveBindings, StepRunOutput, StepRunner, WorkflowContext,
};
pub use step::{
    ConditionalStep, HumanStep, InteractionType, LoopStep, ParallelStep, RiskLevel, StepResult,
    StepStatus, TaskStep, TimeoutBehavior, WorkflowState, WorkflowStatus, WorkflowStep,
};
pub use validation::{detect_cycle, validate, ValidationReport};
