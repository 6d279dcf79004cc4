//! Error types for workflow construction and execution
//!
//! All errors implement `std::error::Error` via `thiserror`. The taxonomy
//! mirrors how failures propagate: validation errors abort before any node
//! runs, node errors mark a step failed and skip its dependants,
//! cancellation is a distinct non-failure outcome, and checkpoint errors
//! wrap the storage layer.

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Comprehensive error type for workflow operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Workflow definition is structurally invalid
    ///
    /// Missing step bindings, unknown dependency ids, self-dependencies,
    /// cyclic graphs, template references to nonexistent steps. Nothing has
    /// executed when this is returned.
    #[error("{0}")]
    Validation(String),

    /// A step's executor failed
    #[error("Step '{step}' execution failed: {error}")]
    StepExecution {
        /// Id of the step that failed
        step: String,
        /// Error message from the executor
        error: String,
    },

    /// General execution error without step context
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The run was aborted by an explicit cancel
    ///
    /// Not a failure: surfaced as a distinct `cancelled` status.
    #[error("Workflow '{0}' was cancelled")]
    Cancelled(String),

    /// An operation exceeded its time budget
    #[error("Operation timed out after {duration_secs}s: {operation}")]
    Timeout {
        /// Description of the operation that timed out
        operation: String,
        /// Budget in seconds
        duration_secs: u64,
    },

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] studio_checkpoint::CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Custom application-defined error
    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    /// Create a step execution error with context
    pub fn step_execution(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            error: error.into(),
        }
    }

    /// Wrap an agent binding failure in the stable validation message
    pub fn config_validation(detail: impl Into<String>) -> Self {
        Self::Validation(format!("Agent configuration validation failed: {}", detail.into()))
    }
}
