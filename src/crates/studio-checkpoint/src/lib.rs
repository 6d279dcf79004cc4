//! # studio-checkpoint - Durable Workflow State Snapshots
//!
//! Checkpoint persistence for claude-studio workflow threads. Every time the
//! workflow executor finishes a node it hands the complete run state to a
//! [`CheckpointSaver`]; each saved snapshot is addressable by
//! `(thread_id, checkpoint_id)` where checkpoint ids increase monotonically
//! within a thread.
//!
//! ## Overview
//!
//! The checkpoint system provides:
//!
//! - **State persistence** - Full workflow state written after every node
//! - **Resume** - Re-enter a run from its latest checkpoint
//! - **Time travel** - Restart from any earlier checkpoint, discarding later state
//! - **Thread isolation** - Independent checkpoint histories per `thread_id`
//! - **Pluggable storage** - Trait-based backends; in-memory and JSON-file
//!   implementations ship with the crate
//!
//! ## Core Types
//!
//! - [`CheckpointSaver`] - Storage backend trait
//! - [`Checkpoint`] - One saved snapshot with its id and timestamp
//! - [`InMemoryCheckpointSaver`] - HashMap-backed store for tests and
//!   short-lived runs
//! - [`FileCheckpointSaver`] - One JSON file per thread under a base
//!   directory; survives restarts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use studio_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
//! use serde_json::json;
//!
//! let saver = InMemoryCheckpointSaver::new();
//! let first = saver.put("thread-1", json!({"stepResults": {}})).await?;
//! assert_eq!(first.checkpoint_id, 1);
//!
//! let latest = saver.latest("thread-1").await?.unwrap();
//! assert_eq!(latest.checkpoint_id, first.checkpoint_id);
//! ```
//!
//! The state payload is an opaque `serde_json::Value`; the workflow crate
//! owns its shape. Backends must never surface a partially written
//! snapshot: a `put` is visible in full or not at all.

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use checkpoint::Checkpoint;
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use traits::CheckpointSaver;
