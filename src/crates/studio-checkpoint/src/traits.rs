//! Extensible checkpoint storage trait for backend implementations
//!
//! This module defines **[`CheckpointSaver`]** - the abstraction the workflow
//! executor writes through after every node. Implementations decide where
//! snapshots live (memory, files, a database) while the executor stays
//! backend-agnostic.
//!
//! # Contract
//!
//! - `put` assigns the next monotonic id for the thread and must be atomic:
//!   a reader never observes a half-written snapshot.
//! - `latest`/`get`/`history` are read-only; a missing thread is `None` /
//!   an empty history, not an error.
//! - `delete_thread` removes the entire history for one thread; other
//!   threads are untouched.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; multiple workflow threads
//! checkpoint concurrently, each under its own `thread_id`.
//!
//! # Example: custom backend
//!
//! ```rust,ignore
//! use studio_checkpoint::{Checkpoint, CheckpointSaver};
//! use async_trait::async_trait;
//!
//! struct SqliteCheckpointSaver { /* pool */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for SqliteCheckpointSaver {
//!     async fn put(&self, thread_id: &str, state: serde_json::Value)
//!         -> studio_checkpoint::Result<Checkpoint>
//!     {
//!         // SELECT MAX(checkpoint_id) ... ; INSERT in one transaction
//!         # unimplemented!()
//!     }
//!     // ... remaining methods ...
//! }
//! ```

use crate::{checkpoint::Checkpoint, error::Result};
use async_trait::async_trait;

/// Core trait for checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Save a new snapshot for the thread, assigning the next monotonic id
    ///
    /// Returns the stored checkpoint including its assigned id.
    async fn put(&self, thread_id: &str, state: serde_json::Value) -> Result<Checkpoint>;

    /// Fetch the most recent checkpoint for a thread, if any exists
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Fetch a specific checkpoint by id
    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>>;

    /// Full checkpoint history for a thread, oldest first
    ///
    /// An unknown thread yields an empty list.
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// Delete every checkpoint belonging to the thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
