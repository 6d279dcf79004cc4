//! Orchestrator services
//!
//! Config resolution ([`agent_configs`]) and the workflow service facade
//! the HTTP handlers call into ([`workflow`]).

pub mod agent_configs;
pub mod workflow;

pub use agent_configs::{AgentConfigService, StudioBindings};
pub use workflow::{InvokeRequest, ResumeRequest, WorkflowService};
