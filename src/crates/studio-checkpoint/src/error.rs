//! Error types for checkpoint operations
//!
//! Backends surface storage-specific failures through
//! [`CheckpointError::Storage`]; the bundled implementations only ever
//! produce `Invalid`, `Serialization` and `Io`.

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A required checkpoint does not exist
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Malformed input (empty thread id, bad snapshot payload)
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// Backend-specific storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// State payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure in the file-backed saver
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
