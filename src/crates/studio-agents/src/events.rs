//! Event streams for the process plane
//!
//! Two typed broadcast families: `process:*` for registry lifecycle and
//! `agent:*` / `message:new` for runtime activity. Subscribers attach once;
//! WebSocket fan-out is an adapter on the orchestrator side.

use crate::ipc::IpcMessage;
use crate::types::AgentStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Registry lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ProcessEvent {
    #[serde(rename = "process:registered")]
    Registered { agent_id: String },

    #[serde(rename = "process:status-change")]
    StatusChange { agent_id: String, status: AgentStatus },

    #[serde(rename = "process:removed")]
    Removed { agent_id: String },
}

/// Runtime activity events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    #[serde(rename = "agent:status-changed")]
    StatusChanged { agent_id: String, status: AgentStatus },

    #[serde(rename = "agent:token-usage")]
    TokenUsage {
        agent_id: String,
        tokens: u32,
        max_tokens: u32,
    },

    #[serde(rename = "message:new")]
    NewMessage { message: IpcMessage },
}

macro_rules! event_hub {
    ($(#[$doc:meta])* $name:ident, $event:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            sender: broadcast::Sender<$event>,
        }

        impl $name {
            pub fn new(capacity: usize) -> Self {
                let (sender, _) = broadcast::channel(capacity);
                Self { sender }
            }

            pub fn subscribe(&self) -> broadcast::Receiver<$event> {
                self.sender.subscribe()
            }

            /// Emit an event; dropped silently when nobody is listening
            pub fn emit(&self, event: $event) {
                let _ = self.sender.send(event);
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(256)
            }
        }
    };
}

event_hub!(
    /// Broadcast hub for `process:*` events
    ProcessEvents,
    ProcessEvent
);
event_hub!(
    /// Broadcast hub for `agent:*` and `message:new` events
    AgentEvents,
    AgentEvent
);
