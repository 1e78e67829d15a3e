//! Host process entry point: wires every component together and serves
//! the HTTP adapter on the configured address.

use ori::ori::agent_store::AgentStore;
use ori::ori::chat::ChatOrchestrator;
use ori::ori::communicator::Communicator;
use ori::ori::config::Config;
use ori::ori::event_bus::EventBus;
use ori::ori::health::{HealthManager, DEFAULT_PROBE_INTERVAL};
use ori::ori::http::{build_router, AppState};
use ori::ori::mcp::{McpRegistry, PING_INTERVAL};
use ori::ori::notification::NotificationService;
use ori::ori::plugin::PluginSupervisor;
use ori::ori::workflow::WorkflowEngine;
use ori::ori::workspace::WorkspaceStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    ori::init_logger();

    let config = Arc::new(Config::from_env());
    let event_bus = EventBus::new();
    let agents = AgentStore::new(config.agent_store_path.clone());
    agents.load().await?;
    let plugins = Arc::new(PluginSupervisor::new());
    let mcp = McpRegistry::new();
    let health = HealthManager::new(Arc::clone(&event_bus));
    let workspaces = WorkspaceStore::new(config.agent_store_path.clone());
    let communicator = Communicator::new(Arc::clone(&workspaces), Arc::clone(&event_bus));
    let workflows = WorkflowEngine::new(Arc::clone(&communicator), Arc::clone(&event_bus));
    let notifications = NotificationService::spawn(Arc::clone(&event_bus));
    spawn_mcp_ping_loop(Arc::clone(&mcp));
    spawn_plugin_health_probe_loop(Arc::clone(&plugins), Arc::clone(&health));
    let chat = ChatOrchestrator::new(
        Arc::clone(&config),
        Arc::clone(&agents),
        Arc::clone(&plugins),
        Arc::clone(&mcp),
        Arc::clone(&health),
    );

    let state = AppState {
        config,
        agents,
        plugins,
        mcp,
        health,
        workspaces,
        communicator,
        workflows,
        event_bus,
        notifications,
        chat,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8787").await?;
    log::info!("ori-agentd listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Ping every running MCP server on a fixed cadence; a failed ping moves
/// the connection's lifecycle to `error` (see `McpServerConnection::ping`).
fn spawn_mcp_ping_loop(mcp: Arc<McpRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        loop {
            interval.tick().await;
            for name in mcp.list().await {
                if let Some(connection) = mcp.get(&name).await {
                    if !connection.ping().await {
                        log::warn!("mcp server '{name}' failed health ping");
                    }
                }
            }
        }
    });
}

/// Probe every loaded plugin on a fixed cadence, recording the outcome in
/// the health manager (see `HealthManager::probe`).
fn spawn_plugin_health_probe_loop(plugins: Arc<PluginSupervisor>, health: Arc<HealthManager>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DEFAULT_PROBE_INTERVAL);
        loop {
            interval.tick().await;
            for name in plugins.list_loaded().await {
                if let Some(adapter) = plugins.get_by_name(&name).await {
                    health.probe(&name, &adapter).await;
                }
            }
        }
    });
}
