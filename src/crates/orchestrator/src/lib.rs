//! # orchestrator - claude-studio Orchestration Service
//!
//! The service crate tying the core together:
//!
//! - [`approval`] - human-in-the-loop approvals: records, state machine,
//!   expiry sweeps, and the gate adapter the workflow executor suspends on
//! - [`executor`] - [`AgentStepRunner`](executor::AgentStepRunner), which
//!   binds workflow task steps to agent processes and runs them through
//!   runtime shims
//! - [`services`] - agent config resolution (project scope, global
//!   fallback) and the workflow service facade
//! - [`api`] - the axum HTTP surface and the WebSocket event fan-out with
//!   the stable outbound event names
//! - [`config`] - environment configuration (`CLAUDE_STUDIO_API`,
//!   `USE_MOCK_AI`, `MCP_STABLE_MODE`)
//!
//! The composition root lives in the `studio-server` binary: it opens the
//! process registry, starts the health monitor and the approval expiry
//! sweep, runs a zombie cleanup pass, wires the executor seams, and serves
//! the router.

pub mod api;
pub mod approval;
pub mod config;
pub mod executor;
pub mod services;

pub use api::{create_router, AppState};
pub use approval::{ApprovalOrchestrator, StudioApprovalGate};
pub use config::StudioConfig;
pub use executor::AgentStepRunner;
pub use services::{AgentConfigService, StudioBindings, WorkflowService};
