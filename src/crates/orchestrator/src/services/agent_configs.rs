//! Agent configuration store and binding resolution
//!
//! Configs exist in two scopes: per-project and global. Resolution for a
//! `(project, role)` pair is project-scoped match first, then global,
//! matching roles case-insensitively. [`StudioBindings`] packages that
//! resolution (plus registry-backed agent-id lookups) as the graph
//! executor's [`BindingResolver`] seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use studio_agents::{AgentConfig, ProcessRegistry, GLOBAL_PROJECT};
use studio_graph::BindingResolver;
use tokio::sync::RwLock;

/// Project-scoped and global agent configurations
#[derive(Default)]
pub struct AgentConfigService {
    global: RwLock<Vec<AgentConfig>>,
    by_project: RwLock<HashMap<String, Vec<AgentConfig>>>,
}

impl AgentConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a global config
    pub async fn add_global(&self, config: AgentConfig) {
        self.global.write().await.push(config);
    }

    /// Register a project-scoped config
    pub async fn add_project(&self, project_id: &str, config: AgentConfig) {
        self.by_project
            .write()
            .await
            .entry(project_id.to_string())
            .or_default()
            .push(config);
    }

    /// Resolve a role: project scope first, global fallback
    pub async fn resolve_role(&self, project_id: Option<&str>, role: &str) -> Option<AgentConfig> {
        if let Some(project) = project_id {
            if let Some(configs) = self.by_project.read().await.get(project) {
                if let Some(config) = configs.iter().find(|c| c.role.eq_ignore_ascii_case(role)) {
                    return Some(config.clone());
                }
            }
        }
        self.global
            .read()
            .await
            .iter()
            .find(|c| c.role.eq_ignore_ascii_case(role))
            .cloned()
    }
}

/// [`BindingResolver`] over the config service and the process registry
pub struct StudioBindings {
    configs: Arc<AgentConfigService>,
    registry: Arc<ProcessRegistry>,
}

impl StudioBindings {
    pub fn new(configs: Arc<AgentConfigService>, registry: Arc<ProcessRegistry>) -> Self {
        Self { configs, registry }
    }
}

#[async_trait]
impl BindingResolver for StudioBindings {
    async fn agent_exists(&self, project_id: Option<&str>, agent_id: &str) -> bool {
        match self.registry.get(agent_id).await {
            Some(agent) => match project_id {
                Some(project) => agent.project_id == project || agent.project_id == GLOBAL_PROJECT,
                None => true,
            },
            None => false,
        }
    }

    async fn resolve_role(&self, project_id: Option<&str>, role: &str) -> Option<String> {
        self.configs
            .resolve_role(project_id, role)
            .await
            .map(|config| config.config_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(role: &str, config_id: &str) -> AgentConfig {
        let mut config = AgentConfig::for_role(role);
        config.config_id = config_id.to_string();
        config
    }

    #[tokio::test]
    async fn test_project_scope_beats_global() {
        let service = AgentConfigService::new();
        service.add_global(config("developer", "global-dev")).await;
        service.add_project("proj", config("developer", "proj-dev")).await;

        let resolved = service.resolve_role(Some("proj"), "developer").await.unwrap();
        assert_eq!(resolved.config_id, "proj-dev");

        // Other projects fall through to the global config
        let resolved = service.resolve_role(Some("other"), "developer").await.unwrap();
        assert_eq!(resolved.config_id, "global-dev");
    }

    #[tokio::test]
    async fn test_role_match_is_case_insensitive() {
        let service = AgentConfigService::new();
        service.add_global(config("Developer", "global-dev")).await;

        assert!(service.resolve_role(None, "developer").await.is_some());
        assert!(service.resolve_role(None, "DEVELOPER").await.is_some());
        assert!(service.resolve_role(None, "reviewer").await.is_none());
    }
}
