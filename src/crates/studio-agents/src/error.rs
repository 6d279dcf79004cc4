//! Error types for the agent process plane

use thiserror::Error;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur across registry, IPC, routing and runtime shims
#[derive(Error, Debug)]
pub enum AgentError {
    /// Target agent does not exist
    #[error("Agent '{0}' not found")]
    NotFound(String),

    /// A name resolves to agents in more than one project
    #[error("ambiguous target '{name}' (projects: {})", projects.join(", "))]
    Ambiguous {
        name: String,
        projects: Vec<String>,
    },

    /// Socket-level failure (missing socket, refused connection, broken pipe)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Registry persistence failed
    #[error("Registry error: {0}")]
    Registry(String),

    /// Child process could not be started
    #[error("Failed to spawn agent: {0}")]
    Spawn(String),

    /// The LLM returned an error frame
    #[error("Claude Code error: {0}")]
    Llm(String),

    /// The LLM capability could not be reached at all
    #[error("Claude Code failed: {0}")]
    LlmTransport(String),

    /// Invocation was aborted by an explicit cancel
    #[error("Query was aborted by user")]
    Aborted,

    /// Operation exceeded its budget
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Malformed batch request (empty, unknown dependency, cycle)
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}
