//! JSON-file checkpoint storage
//!
//! **[`FileCheckpointSaver`]** persists one file per thread under a base
//! directory (`<base>/<thread_id>.json`, thread ids sanitised for the
//! filesystem). Every `put` rewrites the whole file through a temp-file
//! rename, so the on-disk history is always a complete snapshot list.
//!
//! A corrupt history file is reported once per thread and then treated as
//! empty; the run starts a fresh history rather than failing.

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
    traits::CheckpointSaver,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::warn;

/// File-backed checkpoint saver
///
/// Durable across restarts; suitable as the default backend for the
/// workflow executor. Writes are serialised behind a mutex so concurrent
/// `put`s on the same thread cannot interleave file rewrites.
#[derive(Debug)]
pub struct FileCheckpointSaver {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
    corrupt_reported: StdMutex<HashSet<String>>,
}

impl FileCheckpointSaver {
    /// Create a saver rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
            corrupt_reported: StdMutex::new(HashSet::new()),
        })
    }

    /// Path of the history file for a thread
    fn thread_path(&self, thread_id: &str) -> PathBuf {
        let safe: String = thread_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{safe}.json"))
    }

    /// Load a thread's full history; corruption degrades to empty
    async fn load(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let path = self.thread_path(thread_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let mut reported = self.corrupt_reported.lock().expect("corrupt-report lock poisoned");
                if reported.insert(thread_id.to_string()) {
                    warn!(thread_id = %thread_id, path = %path.display(), error = %e,
                        "Corrupt checkpoint file, starting fresh history");
                }
                Ok(Vec::new())
            }
        }
    }

    /// Rewrite a thread's history atomically (temp file + rename)
    async fn store(&self, path: &Path, entries: &[Checkpoint]) -> Result<()> {
        let encoded = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointSaver for FileCheckpointSaver {
    async fn put(&self, thread_id: &str, state: serde_json::Value) -> Result<Checkpoint> {
        if thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.load(thread_id).await?;

        let next_id = entries.last().map(|c| c.checkpoint_id + 1).unwrap_or(1);
        let checkpoint = Checkpoint::new(thread_id, next_id, state);
        entries.push(checkpoint.clone());

        self.store(&self.thread_path(thread_id), &entries).await?;
        Ok(checkpoint)
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.load(thread_id).await?.into_iter().last())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Option<Checkpoint>> {
        Ok(self
            .load(thread_id)
            .await?
            .into_iter()
            .find(|c| c.checkpoint_id == checkpoint_id))
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        self.load(thread_id).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let path = self.thread_path(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_reload_across_instances() {
        let dir = TempDir::new().unwrap();

        {
            let saver = FileCheckpointSaver::new(dir.path()).unwrap();
            saver.put("thread-1", json!({"n": 1})).await.unwrap();
            saver.put("thread-1", json!({"n": 2})).await.unwrap();
        }

        // A fresh instance sees the persisted history
        let saver = FileCheckpointSaver::new(dir.path()).unwrap();
        let history = saver.history("thread-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].checkpoint_id, 2);
        assert_eq!(saver.latest("thread-1").await.unwrap().unwrap().state, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::new(dir.path()).unwrap();

        std::fs::write(dir.path().join("thread-1.json"), "{not json").unwrap();

        assert!(saver.latest("thread-1").await.unwrap().is_none());

        // New history starts at id 1
        let checkpoint = saver.put("thread-1", json!({})).await.unwrap();
        assert_eq!(checkpoint.checkpoint_id, 1);
    }

    #[tokio::test]
    async fn test_thread_id_is_sanitised_for_filenames() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::new(dir.path()).unwrap();

        saver.put("thread/with:odd chars", json!({})).await.unwrap();

        let latest = saver.latest("thread/with:odd chars").await.unwrap();
        assert!(latest.is_some());
    }

    #[tokio::test]
    async fn test_delete_thread_removes_file() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::new(dir.path()).unwrap();

        saver.put("thread-1", json!({})).await.unwrap();
        saver.delete_thread("thread-1").await.unwrap();

        assert!(saver.latest("thread-1").await.unwrap().is_none());
        // Deleting again is not an error
        saver.delete_thread("thread-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_thread_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let saver = FileCheckpointSaver::new(dir.path()).unwrap();

        assert!(saver.history("ghost").await.unwrap().is_empty());
        assert!(saver.get("ghost", 1).await.unwrap().is_none());
    }
}
