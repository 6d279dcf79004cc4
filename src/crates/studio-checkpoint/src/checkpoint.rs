//! Core checkpoint data structure
//!
//! A [`Checkpoint`] is one complete snapshot of a workflow thread's state.
//! Ids are assigned by the storage backend and increase monotonically within
//! a thread, so "the latest checkpoint" and "checkpoint N" are both
//! well-defined addresses. The state payload is opaque JSON owned by the
//! workflow layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved snapshot of workflow state
///
/// Addressable by `(thread_id, checkpoint_id)`. Within a thread, a larger
/// `checkpoint_id` always means a later snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Monotonically increasing id within the thread (first checkpoint is 1)
    pub checkpoint_id: u64,
    /// The workflow thread this snapshot belongs to
    pub thread_id: String,
    /// Complete workflow state at the time of the snapshot
    pub state: serde_json::Value,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint with the given id and state
    pub fn new(thread_id: impl Into<String>, checkpoint_id: u64, state: serde_json::Value) -> Self {
        Self {
            checkpoint_id,
            thread_id: thread_id.into(),
            state,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_round_trips_through_json() {
        let checkpoint = Checkpoint::new("thread-1", 3, json!({"stepResults": {"a": {"status": "success"}}}));

        let encoded = serde_json::to_string(&checkpoint).unwrap();
        let decoded: Checkpoint = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, checkpoint);
    }

    #[test]
    fn test_checkpoint_serializes_camel_case_keys() {
        let checkpoint = Checkpoint::new("thread-1", 1, json!({}));
        let value = serde_json::to_value(&checkpoint).unwrap();

        assert!(value.get("checkpointId").is_some());
        assert!(value.get("threadId").is_some());
        assert!(value.get("createdAt").is_some());
    }
}
