//! Outbound WebSocket event definitions and fan-out state
//!
//! Event names on the wire are exact and stable: `agent:status-changed`,
//! `agent:token-usage`, `message:new`, `workflow:update`,
//! `human_approval_processed`, `human_approval_cancelled`. The
//! `workflow:update` payload nests the workflow event (with its own
//! `step_start`/`step_complete`/... subtype) under `data`.
//!
//! [`BroadcastState`] is the single fan-out hub; forwarder tasks translate
//! the typed internal channels into [`WsEvent`]s.

use crate::approval::{Approval, ApprovalEvent, ApprovalOrchestrator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studio_agents::{AgentEvent, AgentEvents, AgentStatus, IpcMessage, ProcessEvent, ProcessEvents};
use studio_graph::{WorkflowEvent, WorkflowEvents};
use tokio::sync::broadcast;

/// One outbound WebSocket event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WsEvent {
    #[serde(rename = "agent:status-changed")]
    AgentStatusChanged { agent_id: String, status: AgentStatus },

    #[serde(rename = "agent:token-usage")]
    AgentTokenUsage {
        agent_id: String,
        tokens: u32,
        max_tokens: u32,
    },

    #[serde(rename = "message:new")]
    MessageNew { message: IpcMessage },

    #[serde(rename = "workflow:update")]
    WorkflowUpdate { data: WorkflowEvent },

    #[serde(rename = "human_approval_processed")]
    HumanApprovalProcessed { approval: Approval },

    #[serde(rename = "human_approval_cancelled")]
    HumanApprovalCancelled { approval: Approval },
}

impl WsEvent {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::AgentStatusChanged { .. } => "agent:status-changed",
            WsEvent::AgentTokenUsage { .. } => "agent:token-usage",
            WsEvent::MessageNew { .. } => "message:new",
            WsEvent::WorkflowUpdate { .. } => "workflow:update",
            WsEvent::HumanApprovalProcessed { .. } => "human_approval_processed",
            WsEvent::HumanApprovalCancelled { .. } => "human_approval_cancelled",
        }
    }
}

/// Shared fan-out channel for all connected WebSocket clients
#[derive(Debug)]
pub struct BroadcastState {
    sender: broadcast::Sender<WsEvent>,
}

impl BroadcastState {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: WsEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for BroadcastState {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Bridge every internal event family onto the WebSocket channel
pub fn spawn_forwarders(
    broadcast: Arc<BroadcastState>,
    workflow_events: &WorkflowEvents,
    agent_events: &AgentEvents,
    process_events: &ProcessEvents,
    approvals: &ApprovalOrchestrator,
) {
    let mut workflow_rx = workflow_events.subscribe();
    {
        let broadcast = Arc::clone(&broadcast);
        tokio::spawn(async move {
            while let Ok(event) = workflow_rx.recv().await {
                broadcast.emit(WsEvent::WorkflowUpdate { data: event });
            }
        });
    }

    let mut agent_rx = agent_events.subscribe();
    {
        let broadcast = Arc::clone(&broadcast);
        tokio::spawn(async move {
            while let Ok(event) = agent_rx.recv().await {
                let mapped = match event {
                    AgentEvent::StatusChanged { agent_id, status } => {
                        WsEvent::AgentStatusChanged { agent_id, status }
                    }
                    AgentEvent::TokenUsage { agent_id, tokens, max_tokens } => WsEvent::AgentTokenUsage {
                        agent_id,
                        tokens,
                        max_tokens,
                    },
                    AgentEvent::NewMessage { message } => WsEvent::MessageNew { message },
                };
                broadcast.emit(mapped);
            }
        });
    }

    let mut process_rx = process_events.subscribe();
    {
        let broadcast = Arc::clone(&broadcast);
        tokio::spawn(async move {
            while let Ok(event) = process_rx.recv().await {
                // Registry transitions surface as agent status changes;
                // register/remove have no WebSocket counterpart.
                if let ProcessEvent::StatusChange { agent_id, status } = event {
                    broadcast.emit(WsEvent::AgentStatusChanged { agent_id, status });
                }
            }
        });
    }

    let mut approval_rx = approvals.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = approval_rx.recv().await {
            let mapped = match event {
                ApprovalEvent::Processed { approval } => WsEvent::HumanApprovalProcessed { approval },
                ApprovalEvent::Cancelled { approval } => WsEvent::HumanApprovalCancelled { approval },
            };
            broadcast.emit(mapped);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_are_stable() {
        let event = WsEvent::AgentStatusChanged {
            agent_id: "a".to_string(),
            status: AgentStatus::Busy,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "agent:status-changed");
        assert_eq!(value["agentId"], "a");
    }

    #[test]
    fn test_workflow_update_nests_subtype() {
        let event = WsEvent::WorkflowUpdate {
            data: WorkflowEvent::StepStart {
                thread_id: "t".to_string(),
                step_id: "a".to_string(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "workflow:update");
        assert_eq!(value["data"]["type"], "step_start");
    }

    #[tokio::test]
    async fn test_forwarders_bridge_workflow_events() {
        let broadcast = Arc::new(BroadcastState::default());
        let workflow_events = WorkflowEvents::default();
        let agent_events = AgentEvents::default();
        let process_events = ProcessEvents::default();
        let approvals = ApprovalOrchestrator::new();

        spawn_forwarders(
            Arc::clone(&broadcast),
            &workflow_events,
            &agent_events,
            &process_events,
            &approvals,
        );
        let mut rx = broadcast.subscribe();

        workflow_events.emit(WorkflowEvent::WorkflowComplete { thread_id: "t".to_string() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "workflow:update");
    }
}
