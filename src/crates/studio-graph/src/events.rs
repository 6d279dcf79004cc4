//! Real-time workflow events
//!
//! Every state change during execution emits a [`WorkflowEvent`] on a
//! broadcast channel. Subscribers (the WebSocket fan-out, tests) receive
//! events in emission order; emitting with no subscribers is a no-op.
//! On the wire these are the `workflow:update` family, discriminated by
//! `type`.

use crate::graph::WorkflowGraph;
use crate::step::StepStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One workflow state change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkflowEvent {
    /// A step began executing
    StepStart { thread_id: String, step_id: String },

    /// A step reached a terminal status
    StepComplete {
        thread_id: String,
        step_id: String,
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// A step failed
    StepFailed {
        thread_id: String,
        step_id: String,
        error: String,
    },

    /// The run finished with every executed step successful
    WorkflowComplete { thread_id: String },

    /// The run finished with failures or was cancelled
    WorkflowFailed { thread_id: String, reason: String },

    /// The run is suspended waiting on a human gate
    WorkflowPaused { thread_id: String, step_id: String },

    /// Full graph snapshot for visual observers
    GraphUpdate { thread_id: String, graph: WorkflowGraph },
}

impl WorkflowEvent {
    /// Wire name of the event subtype
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::StepStart { .. } => "step_start",
            WorkflowEvent::StepComplete { .. } => "step_complete",
            WorkflowEvent::StepFailed { .. } => "step_failed",
            WorkflowEvent::WorkflowComplete { .. } => "workflow_complete",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
            WorkflowEvent::WorkflowPaused { .. } => "workflow_paused",
            WorkflowEvent::GraphUpdate { .. } => "graph_update",
        }
    }

    /// Thread the event belongs to
    pub fn thread_id(&self) -> &str {
        match self {
            WorkflowEvent::StepStart { thread_id, .. }
            | WorkflowEvent::StepComplete { thread_id, .. }
            | WorkflowEvent::StepFailed { thread_id, .. }
            | WorkflowEvent::WorkflowComplete { thread_id }
            | WorkflowEvent::WorkflowFailed { thread_id, .. }
            | WorkflowEvent::WorkflowPaused { thread_id, .. }
            | WorkflowEvent::GraphUpdate { thread_id, .. } => thread_id,
        }
    }
}

/// Broadcast hub for workflow events
#[derive(Debug, Clone)]
pub struct WorkflowEvents {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEvents {
    /// Create a hub with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Emit an event; dropped silently when nobody is listening
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for WorkflowEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
