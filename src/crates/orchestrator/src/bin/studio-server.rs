//! Studio server binary
//!
//! Composition root for the core: opens the process registry, starts the
//! health monitor and approval expiry sweep, runs a zombie cleanup pass,
//! wires the workflow executor's seams, and serves the HTTP/WebSocket
//! surface until SIGINT/SIGTERM.

use orchestrator::api::ws::{spawn_forwarders, BroadcastState};
use orchestrator::api::{create_router, AppState};
use orchestrator::approval::{ApprovalOrchestrator, StudioApprovalGate};
use orchestrator::executor::AgentStepRunner;
use orchestrator::services::{AgentConfigService, StudioBindings, WorkflowService};
use orchestrator::StudioConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use studio_agents::{
    default_agent_pattern, registry_path, AgentEvents, CommandSpawner, IpcClient, IpcDelivery,
    LlmClient, MessageRouter, MockLlmClient, NixSignals, ProcessCleaner, ProcessManager,
    ProcessRegistry, PsEnumerator, HEALTH_CHECK_INTERVAL,
};
use studio_checkpoint::FileCheckpointSaver;
use studio_graph::WorkflowExecutor;
use tracing_subscriber::EnvFilter;

/// Cadence of the approval expiry sweep
const APPROVAL_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = StudioConfig::from_env();
    tracing::info!(api_url = %config.api_url, mock = config.use_mock_ai, stable = config.stable_mode,
        "Starting studio server");

    // Process plane: registry, health monitor, startup zombie sweep
    let signals = Arc::new(NixSignals);
    let registry = Arc::new(ProcessRegistry::open(registry_path(), signals.clone()));
    let _health_monitor = registry.start_health_monitor(HEALTH_CHECK_INTERVAL);

    let cleaner = ProcessCleaner::new(
        registry.clone(),
        Arc::new(PsEnumerator),
        signals,
        default_agent_pattern(),
    );
    match cleaner.cleanup_zombies().await {
        Ok(result) if !result.killed_processes.is_empty() || result.cleaned_registry_entries > 0 => {
            tracing::info!(
                killed = result.killed_processes.len(),
                pruned = result.cleaned_registry_entries,
                "Startup zombie cleanup"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Startup zombie cleanup failed"),
    }

    // Spawning, routing, runtime shims
    let manager = Arc::new(ProcessManager::new(
        registry.clone(),
        Arc::new(CommandSpawner::new("claude-code", &config.api_url)),
    ));
    let router = Arc::new(MessageRouter::new(
        manager.clone(),
        Arc::new(IpcDelivery::new(IpcClient::new())),
    ));

    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
    if !config.use_mock_ai {
        tracing::warn!("No LLM SDK capability wired; agent responses use the deterministic mock client");
    }

    // Workflow executor and its seams
    let configs = Arc::new(AgentConfigService::new());
    let agent_events = AgentEvents::default();
    let step_runner = Arc::new(AgentStepRunner::new(
        registry.clone(),
        manager,
        configs.clone(),
        llm,
        agent_events.clone(),
    ));

    let approvals = Arc::new(ApprovalOrchestrator::new());
    let _expiry_sweep = approvals.start_expiry_sweep(APPROVAL_SWEEP_INTERVAL);
    let gate = Arc::new(StudioApprovalGate::new(approvals.clone(), config.use_mock_ai));
    let bindings = Arc::new(StudioBindings::new(configs, registry.clone()));

    let checkpoint_dir = std::env::temp_dir().join("claude-agents").join("checkpoints");
    let saver = Arc::new(FileCheckpointSaver::new(checkpoint_dir)?);
    let executor = Arc::new(WorkflowExecutor::new(saver, step_runner, gate, bindings));

    // WebSocket fan-out over every event family
    let broadcast = Arc::new(BroadcastState::default());
    spawn_forwarders(
        broadcast.clone(),
        executor.events(),
        &agent_events,
        registry.events(),
        &approvals,
    );

    let app = create_router(AppState {
        workflows: Arc::new(WorkflowService::new(executor)),
        approvals,
        router,
        broadcast,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, flushing registry");
    registry.shutdown().await?;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
