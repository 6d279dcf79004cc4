//! # studio-agents - Agent Process Plane
//!
//! Everything claude-studio needs to run long-lived agent subprocesses on
//! one host:
//!
//! - [`ProcessRegistry`] - the single source of truth for agent process
//!   records, mirrored to `<tmp>/claude-agents/registry.json` and
//!   health-checked on a 30-second cadence
//! - [`ProcessCleaner`] - zombie discovery over `ps` output plus
//!   TERM/KILL reclamation and registry pruning
//! - [`ipc`] - per-agent Unix domain sockets speaking newline-delimited
//!   JSON frames; server, client and message schema
//! - [`MessageRouter`] - `@mention` parsing, auto-revival of offline
//!   targets, project broadcast, and dependency-ordered batches with
//!   `all`/`any`/`none` wait strategies
//! - [`AgentRuntime`] - the shim between an agent and the LLM capability:
//!   session tracking, token-usage events, cancellation, error mapping
//! - [`ProcessManager`] - spawn/respawn and the [`AgentLocator`]
//!   capability the router resolves targets through
//!
//! Components are wired explicitly through constructors; there are no
//! process-wide singletons. Every external effect (OS signals, process
//! enumeration, sockets, the LLM SDK) sits behind a trait so the whole
//! plane is testable in-process.

pub mod cleaner;
pub mod error;
pub mod events;
pub mod ipc;
pub mod llm;
pub mod manager;
pub mod probe;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod types;

pub use cleaner::{default_agent_pattern, CleanupResult, DiscoveredProcess, ProcessCleaner, ProcessEnumerator, PsEnumerator};
pub use error::{AgentError, Result};
pub use events::{AgentEvent, AgentEvents, ProcessEvent, ProcessEvents};
pub use ipc::{IpcClient, IpcMessage, IpcMessageType, IpcServer, MessageHandler};
pub use llm::{LlmClient, LlmEvent, LlmEventStream, MockLlmClient};
pub use manager::{AgentLocator, AgentSpawner, CommandSpawner, ProcessManager};
pub use probe::{NixSignals, ProcessProbe, ProcessSignals};
pub use registry::{HealthCheck, ProcessRegistry, HEALTH_CHECK_INTERVAL};
pub use router::{
    has_mentions, is_broadcast, parse_mentions, BatchMessage, BatchMessageOutcome,
    BatchMessageStatus, BatchOptions, BatchOutcome, BroadcastOutcome, IpcDelivery, Mention,
    MessageDelivery, MessageRouter, RouteOutcome, WaitStrategy,
};
pub use runtime::{normalize_tool_name, AgentInfo, AgentRuntime};
pub use types::{
    registry_path, socket_path, AgentConfig, AgentProcess, AgentStatus, RegistryFile,
    GLOBAL_PROJECT, REGISTRY_VERSION,
};
