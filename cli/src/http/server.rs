use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use artiflow_core::api::{AppConfig, CliError};
use artiflow_plugins::factory::{build_context, build_orchestrator};
use axum::middleware;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;
use crate::commands::run::load_definition;

const STATE_FILE: &str = "artiflow.state";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

fn get_servers_dir() -> Result<PathBuf, CliError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CliError::Command("Cannot find home directory".to_string()))?;
    let servers_dir = home.join(".artiflow").join("servers");
    fs::create_dir_all(&servers_dir)
        .map_err(|e| CliError::Command(format!("Failed to create servers directory: {e}")))?;
    Ok(servers_dir)
}

/// Lets local tools discover a running server.
fn write_state_file(server_id: &str, config: &ServerConfig, pipeline: &str) -> Result<(), CliError> {
    let state_file = get_servers_dir()?.join(STATE_FILE);

    let state = serde_json::json!({
        "server_id": server_id,
        "pipeline": pipeline,
        "port": config.port,
        "pid": std::process::id(),
        "url": format!("http://{}:{}", config.host, config.port),
        "started_at": chrono::Local::now().to_rfc3339()
    });
    let body = serde_json::to_string_pretty(&state)
        .map_err(|e| CliError::Command(format!("Failed to encode state file: {e}")))?;
    fs::write(&state_file, body)
        .map_err(|e| CliError::Command(format!("Failed to write state file: {e}")))?;

    info!("State file written to: {}", state_file.display());
    Ok(())
}

fn remove_state_file() {
    match get_servers_dir() {
        Ok(dir) => {
            let path = dir.join(STATE_FILE);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove state file: {}", e);
            } else {
                info!("State file removed: {}", path.display());
            }
        }
        Err(e) => warn!("Failed to locate state file: {}", e),
    }
}

/// `artiflow serve`
pub async fn handle_serve(args: ServeArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let definition = load_definition(&args.pipeline)?;

    let config = ServerConfig {
        host: args.host.unwrap_or_else(|| cfg.http_server.host.clone()),
        port: args.port.unwrap_or(cfg.http_server.port),
        request_timeout: Duration::from_secs(cfg.http_server.request_timeout_secs.max(1)),
    };

    // Runs in the background of a server must not draw progress bars.
    let ctx = build_context(cfg, false).map_err(|e| CliError::Command(format!("{e:#}")))?;
    let orchestrator =
        build_orchestrator(&ctx, &definition).map_err(|e| CliError::Config(format!("{e:#}")))?;

    let server_id = Uuid::new_v4().to_string();
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(server_id.clone(), ctx, orchestrator, shutdown_tx);

    write_state_file(&server_id, &config, &definition.name)?;
    let served = start_server(config, state).await;
    remove_state_file();

    served.map_err(|e| CliError::Command(e.to_string()))?;
    Ok(0)
}

pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        server_id = %state.server_id,
        pipeline = %state.orchestrator.pipeline().name(),
        "Starting HTTP server on {}:{}",
        config.host,
        config.port
    );

    let app = create_router(state.clone())
        .layer(middleware::from_fn(request_logger))
        .layer(create_middleware_stack(config.request_timeout));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM signal");
                }
            }
            info!("Starting graceful shutdown...");
        })
        .await?;

    let active = state.orchestrator.registry().active();
    if !active.is_empty() {
        warn!(sessions = ?active, "server stopped with runs still in flight");
    }
    info!("Server shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
