//! IPC message schema and newline-delimited JSON framing
//!
//! One JSON object per line on the socket. The schema matches the wire
//! contract: `{from, to, type, content, timestamp, correlationId?}` with
//! millisecond epoch timestamps. `content` may be a plain string or any
//! structured value.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Address used when the recipient is not known
pub const UNKNOWN_AGENT: &str = "unknown";

/// Message kind on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IpcMessageType {
    Mention,
    Response,
    Broadcast,
    Error,
}

/// One framed IPC message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpcMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: IpcMessageType,
    pub content: Value,
    /// Millisecond epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl IpcMessage {
    fn base(from: &str, to: &str, message_type: IpcMessageType, content: Value) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            message_type,
            content,
            timestamp: Utc::now().timestamp_millis(),
            correlation_id: None,
            project_id: None,
        }
    }

    /// Directed mention carrying a fresh correlation id
    pub fn mention(from: &str, to: &str, content: impl Into<Value>) -> Self {
        let mut message = Self::base(from, to, IpcMessageType::Mention, content.into());
        message.correlation_id = Some(Uuid::new_v4().to_string());
        message
    }

    /// Reply correlated to an inbound message
    pub fn response(from: &str, to: &str, content: impl Into<Value>, correlation_id: Option<String>) -> Self {
        let mut message = Self::base(from, to, IpcMessageType::Response, content.into());
        message.correlation_id = correlation_id;
        message
    }

    /// Fan-out message with no specific recipient
    pub fn broadcast(from: &str, content: impl Into<Value>) -> Self {
        Self::base(from, UNKNOWN_AGENT, IpcMessageType::Broadcast, content.into())
    }

    /// Error frame sent back to a peer
    pub fn error(from: &str, to: &str, detail: impl Into<String>) -> Self {
        Self::base(from, to, IpcMessageType::Error, Value::String(detail.into()))
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Content as text, stringifying structured payloads
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Encode as one newline-terminated frame
    pub fn to_frame(&self) -> serde_json::Result<String> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }

    /// Parse one frame (the line without its terminator)
    pub fn from_frame(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}
