mod api;
mod auth;
mod state;

use anyhow::Result;
use clap::Parser;
use ra_domain::{ProviderConfig, ServerConfig};
use ra_sessions::SessionManager;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

/// Serial reasoning-loop agent daemon: one HTTP service multiplexing many
/// long-lived, single-worker conversation sessions over a local repo.
#[derive(Parser, Debug)]
#[command(name = "agentd", version, about)]
struct Cli {
    /// Repo root the search_files/read_file/list_dir tools are confined to.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Bind host. Falls back to AGENTD_HOST, then 127.0.0.1.
    #[arg(long)]
    host: Option<String>,

    /// Bind port. Falls back to AGENTD_PORT, then 8765.
    #[arg(long)]
    port: Option<u16>,

    /// Shared bearer token required in X-Agent-Token. Falls back to
    /// AGENTD_AUTH_TOKEN; unset disables auth entirely.
    #[arg(long)]
    auth_token: Option<String>,

    /// Per-session event ring buffer capacity.
    #[arg(long)]
    max_events: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    ra_domain::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ra_gateway=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut server_config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    if let Some(token) = cli.auth_token {
        server_config.auth_token = Some(token);
    }
    if let Some(max_events) = cli.max_events {
        server_config.max_events_per_session = max_events;
    }

    let provider_config = ProviderConfig::from_env()?;
    tracing::info!(provider = %provider_config.provider.as_str(), model = %provider_config.model_id, "loaded provider config");

    let workspace_root = cli.workspace.canonicalize().unwrap_or(cli.workspace);
    let sessions = Arc::new(SessionManager::new(
        &provider_config,
        workspace_root,
        server_config.max_events_per_session,
    ));

    let shutdown = Arc::new(Notify::new());
    let state = AppState {
        sessions: Arc::clone(&sessions),
        auth_token: server_config.auth_token.clone(),
        shutdown: Arc::clone(&shutdown),
    };

    let app = api::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "agentd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await?;

    sessions.stop_all().await;
    Ok(())
}
