//! Workflow step execution against agent runtimes
//!
//! [`AgentStepRunner`] is the orchestrator's implementation of the graph
//! executor's [`StepRunner`] seam. For each task step it binds the step to
//! a concrete agent (explicit `agentId`, an existing agent for the role,
//! or a fresh spawn from the resolved config), then runs the substituted
//! prompt through that agent's [`AgentRuntime`], resuming the step's LLM
//! session when one is recorded.

use crate::services::AgentConfigService;
use async_trait::async_trait;
use std::sync::Arc;
use studio_agents::{
    AgentError, AgentEvents, AgentLocator, AgentProcess, AgentRuntime, LlmClient, ProcessManager,
    ProcessRegistry,
};
use studio_graph::{GraphError, StepRunOutput, StepRunner, TaskStep, WorkflowContext};
use tracing::debug;
use uuid::Uuid;

/// Runs task steps on agent processes
pub struct AgentStepRunner {
    registry: Arc<ProcessRegistry>,
    manager: Arc<ProcessManager>,
    configs: Arc<AgentConfigService>,
    llm: Arc<dyn LlmClient>,
    events: AgentEvents,
}

impl AgentStepRunner {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        manager: Arc<ProcessManager>,
        configs: Arc<AgentConfigService>,
        llm: Arc<dyn LlmClient>,
        events: AgentEvents,
    ) -> Self {
        Self {
            registry,
            manager,
            configs,
            llm,
            events,
        }
    }

    /// Bind a step to a live agent process
    async fn bind(&self, step: &TaskStep, ctx: &WorkflowContext) -> studio_graph::Result<AgentProcess> {
        let project = ctx.project_id.as_deref();

        if let Some(agent_id) = &step.agent_id {
            return self
                .manager
                .ensure_alive(agent_id)
                .await
                .map_err(|e| GraphError::config_validation(e.to_string()));
        }

        let role = step
            .role
            .as_deref()
            .ok_or_else(|| GraphError::config_validation(format!("step '{}' has no binding", step.id)))?;

        match self.manager.find(role, project).await {
            Ok(agent) => self
                .manager
                .ensure_alive(&agent.agent_id)
                .await
                .map_err(|e| GraphError::step_execution(&step.id, e.to_string())),
            Err(AgentError::NotFound(_)) => {
                let config = self
                    .configs
                    .resolve_role(project, role)
                    .await
                    .ok_or_else(|| GraphError::config_validation(format!("no agent found for role {role}")))?;

                let agent_id = format!("{role}-{}", &Uuid::new_v4().to_string()[..8]);
                debug!(agent_id = %agent_id, role, "No agent for role, spawning one");
                self.manager
                    .spawn_agent(&agent_id, project, role, config)
                    .await
                    .map_err(|e| GraphError::step_execution(&step.id, e.to_string()))
            }
            Err(e) => Err(GraphError::step_execution(&step.id, e.to_string())),
        }
    }
}

#[async_trait]
impl StepRunner for AgentStepRunner {
    async fn run_task(
        &self,
        step: &TaskStep,
        prompt: &str,
        ctx: &WorkflowContext,
    ) -> studio_graph::Result<StepRunOutput> {
        let agent = self.bind(step, ctx).await?;

        let runtime = AgentRuntime::new(
            agent.agent_id.clone(),
            agent.role.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.llm),
            self.events.clone(),
        );

        // Resume the step's own session when the workflow has one recorded
        let session = ctx.session_ids.get(&step.id).cloned();
        let response = runtime
            .send_message(prompt, None, session, false)
            .await
            .map_err(|e| match e {
                AgentError::Aborted => GraphError::Cancelled(ctx.thread_id.clone()),
                other => GraphError::step_execution(&step.id, other.to_string()),
            })?;

        Ok(StepRunOutput {
            response,
            session_id: runtime.session_id(),
        })
    }
}
