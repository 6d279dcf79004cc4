//! Agent runtime shim
//!
//! [`AgentRuntime`] wraps the [`LlmClient`] capability for one agent:
//! status transitions around every invocation, session-id tracking with
//! write-back to the registry, token-usage events, tool-name
//! normalisation, and cancellation that suppresses any frame arriving
//! after the abort.
//!
//! Error mapping is part of the contract: an LLM error frame (or an error
//! result frame) fails with `Claude Code error: <msg>`, transport problems
//! wrap as `Claude Code failed: <msg>`, and an abort always surfaces as
//! `Query was aborted by user`.

use crate::error::{AgentError, Result};
use crate::events::{AgentEvent, AgentEvents};
use crate::llm::{LlmClient, LlmEvent};
use crate::registry::ProcessRegistry;
use crate::types::{AgentConfig, AgentStatus};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::watch;
use tracing::{debug, warn};

type SessionCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Canonical tool names for the LLM capability
///
/// Known aliases map to their canonical form; unknown tools are
/// title-cased.
pub fn normalize_tool_name(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "bash" => "Bash".to_string(),
        "read" => "Read".to_string(),
        "write" => "Write".to_string(),
        "edit" => "Edit".to_string(),
        "grep" => "Grep".to_string(),
        "glob" => "Glob".to_string(),
        "ls" => "LS".to_string(),
        "task" => "Task".to_string(),
        "webfetch" => "WebFetch".to_string(),
        "websearch" => "WebSearch".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// Snapshot of a runtime's identity and state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    pub role: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Per-agent wrapper around the LLM capability
pub struct AgentRuntime {
    agent_id: String,
    role: String,
    registry: Arc<ProcessRegistry>,
    llm: Arc<dyn LlmClient>,
    events: AgentEvents,
    session_id: StdMutex<Option<String>>,
    session_callbacks: StdMutex<Vec<SessionCallback>>,
    abort_tx: StdMutex<Option<watch::Sender<bool>>>,
}

impl AgentRuntime {
    pub fn new(
        agent_id: impl Into<String>,
        role: impl Into<String>,
        registry: Arc<ProcessRegistry>,
        llm: Arc<dyn LlmClient>,
        events: AgentEvents,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            registry,
            llm,
            events,
            session_id: StdMutex::new(None),
            session_callbacks: StdMutex::new(Vec::new()),
            abort_tx: StdMutex::new(None),
        }
    }

    /// Register a callback fired whenever the tracked session id changes
    pub fn on_session_update(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.session_callbacks
            .lock()
            .expect("session callback lock poisoned")
            .push(Box::new(callback));
    }

    /// Currently tracked session handle
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().expect("session lock poisoned").clone()
    }

    /// Identity and current status
    pub async fn get_info(&self) -> AgentInfo {
        let status = self
            .registry
            .get(&self.agent_id)
            .await
            .map(|a| a.status)
            .unwrap_or(AgentStatus::Offline);
        AgentInfo {
            agent_id: self.agent_id.clone(),
            role: self.role.clone(),
            status,
            session_id: self.session_id(),
        }
    }

    /// Abort the in-flight invocation, if any
    pub fn abort(&self) -> bool {
        match &*self.abort_tx.lock().expect("abort lock poisoned") {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Run one prompt through the LLM and return the final response text
    ///
    /// `force_new_session` clears the tracked session so no resume occurs.
    pub async fn send_message(
        &self,
        content: &str,
        _project_path: Option<&str>,
        session_override: Option<String>,
        force_new_session: bool,
    ) -> Result<String> {
        let mut config = self
            .registry
            .get(&self.agent_id)
            .await
            .map(|a| a.config)
            .unwrap_or_else(|| AgentConfig::for_role(&self.role));
        config.tools = config.tools.iter().map(|t| normalize_tool_name(t)).collect();

        if force_new_session {
            *self.session_id.lock().expect("session lock poisoned") = None;
        }
        let session = session_override.or_else(|| self.session_id());

        self.set_status(AgentStatus::Busy).await;

        let (tx, rx) = watch::channel(false);
        *self.abort_tx.lock().expect("abort lock poisoned") = Some(tx);

        let result = self.consume_stream(content, &config, session, rx).await;

        *self.abort_tx.lock().expect("abort lock poisoned") = None;
        self.set_status(AgentStatus::Online).await;
        result
    }

    async fn consume_stream(
        &self,
        prompt: &str,
        config: &AgentConfig,
        session: Option<String>,
        cancel: watch::Receiver<bool>,
    ) -> Result<String> {
        let mut stream = self
            .llm
            .invoke(prompt, config, session.as_deref(), cancel.clone())
            .await
            .map_err(|e| match e {
                AgentError::Llm(_) | AgentError::Aborted => e,
                other => AgentError::LlmTransport(other.to_string()),
            })?;

        let mut response = String::new();
        while let Some(event) = stream.next().await {
            // Frames received after an abort must not be forwarded
            if *cancel.borrow() {
                debug!(agent_id = %self.agent_id, "Dropping frame after abort");
                return Err(AgentError::Aborted);
            }

            if let Some(session_id) = event.session_id() {
                self.track_session(session_id).await;
            }

            match event {
                LlmEvent::Assistant { content, tokens, .. } => {
                    if let Some(tokens) = tokens {
                        self.events.emit(AgentEvent::TokenUsage {
                            agent_id: self.agent_id.clone(),
                            tokens,
                            max_tokens: config.max_tokens,
                        });
                    }
                    response = content;
                }
                LlmEvent::Result { is_error: true, content, .. } => {
                    return Err(AgentError::Llm(content));
                }
                LlmEvent::Result { is_error: false, content, .. } => {
                    if !content.is_empty() {
                        response = content;
                    }
                }
                LlmEvent::Error { aborted: true, .. } => return Err(AgentError::Aborted),
                LlmEvent::Error { message, .. } => return Err(AgentError::Llm(message)),
                LlmEvent::User { .. } | LlmEvent::Meta { .. } => {}
            }
        }
        Ok(response)
    }

    /// Adopt a new session handle: callbacks plus registry write-back
    async fn track_session(&self, session_id: &str) {
        let changed = {
            let mut tracked = self.session_id.lock().expect("session lock poisoned");
            if tracked.as_deref() == Some(session_id) {
                false
            } else {
                *tracked = Some(session_id.to_string());
                true
            }
        };
        if !changed {
            return;
        }

        for callback in self.session_callbacks.lock().expect("session callback lock poisoned").iter() {
            callback(session_id);
        }
        if let Err(e) = self.registry.update_session(&self.agent_id, session_id).await {
            warn!(agent_id = %self.agent_id, error = %e, "Session write-back failed");
        }
    }

    async fn set_status(&self, status: AgentStatus) {
        if let Err(e) = self.registry.update_status(&self.agent_id, status).await {
            debug!(agent_id = %self.agent_id, error = %e, "Status update skipped");
        }
        self.events.emit(AgentEvent::StatusChanged {
            agent_id: self.agent_id.clone(),
            status,
        });
    }
}
