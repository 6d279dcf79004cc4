//! In-memory checkpoint storage for development and testing
//!
//! **[`InMemoryCheckpointSaver`]** keeps every thread's history in a
//! `HashMap` behind a `tokio::sync::RwLock`. All operations are
//! microsecond-fast and everything is lost on restart - ideal for tests and
//! short-lived runs, the wrong tool for anything that must survive a crash
//! (use [`FileCheckpointSaver`](crate::FileCheckpointSaver) there).
//!
//! Beyond the trait methods it exposes `thread_count`, `checkpoint_count`
//! and `clear` for test isolation.

use crate::{
    checkpoint::Checkpoint,
    error::Result,
    traits::CheckpointSaver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver implementation
///
/// Reference implementation of [`CheckpointSaver`]. Cloning is shallow;
/// clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.values().map(|entries| entries.len()).sum()
    }

    /// Drop every checkpoint (useful between tests)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(&self, thread_id: &str, state: serde_json::Value) -> Result<Checkpoint> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.to_string()).or_default();

        let next_id = entries.last().map(|c| c.checkpoint_id + 1).unwrap_or(1);
        let checkpoint = Checkpoint::new(thread_id, next_id, state);
        entries.push(checkpoint.clone());

        Ok(checkpoint)
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| entries.last().cloned()))
    }

    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.iter().find(|c| c.checkpoint_id == checkpoint_id).cloned()))
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).cloned().unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
