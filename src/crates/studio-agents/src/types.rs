//! Agent process records and registry file schema
//!
//! [`AgentProcess`] is the authoritative record for one agent subprocess.
//! The registry mirrors its full map to `<tmp>/claude-agents/registry.json`
//! ([`RegistryFile`]) after every mutation. Socket paths and the registry
//! path both live under the per-user temporary directory so everything an
//! agent leaves on disk is discoverable in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Project sentinel for agents not owned by any project
pub const GLOBAL_PROJECT: &str = "global";

/// Registry file schema version
pub const REGISTRY_VERSION: &str = "1.0.0";

/// Where the registry file lives
pub fn registry_path() -> PathBuf {
    std::env::temp_dir().join("claude-agents").join("registry.json")
}

/// IPC socket path for one agent
pub fn socket_path(agent_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!("claude-agents.{agent_id}"))
}

/// Lifecycle status of an agent process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered, process not yet confirmed up
    Ready,
    /// Alive and idle
    Online,
    /// Alive and handling a message
    Busy,
    /// Process gone or unreachable
    Offline,
}

/// Agent configuration, resolvable per project with global fallback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub config_id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_turns() -> u32 {
    50
}

impl AgentConfig {
    /// Minimal config for a role, with defaults everywhere else
    pub fn for_role(role: &str) -> Self {
        Self {
            config_id: format!("cfg-{role}"),
            name: role.to_string(),
            role: role.to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_turns: default_max_turns(),
        }
    }
}

/// Authoritative record for one agent subprocess
///
/// Invariant: a record with `status != Offline` always carries a pid.
/// `last_activity` never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentProcess {
    pub agent_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub role: String,
    pub config: AgentConfig,
}

impl AgentProcess {
    /// Fresh record in `Ready` state
    pub fn new(agent_id: impl Into<String>, project_id: impl Into<String>, role: impl Into<String>, config: AgentConfig) -> Self {
        let role = role.into();
        Self {
            agent_id: agent_id.into(),
            project_id: project_id.into(),
            pid: None,
            status: AgentStatus::Ready,
            session_id: None,
            last_activity: Utc::now(),
            role,
            config,
        }
    }

    /// Advance `last_activity`, never moving it backwards
    pub fn touch(&mut self) {
        self.last_activity = self.last_activity.max(Utc::now());
    }
}

/// On-disk registry schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    pub processes: HashMap<String, AgentProcess>,
    pub last_cleanup: DateTime<Utc>,
    pub version: String,
}

impl RegistryFile {
    pub fn new(processes: HashMap<String, AgentProcess>) -> Self {
        Self {
            processes,
            last_cleanup: Utc::now(),
            version: REGISTRY_VERSION.to_string(),
        }
    }
}
