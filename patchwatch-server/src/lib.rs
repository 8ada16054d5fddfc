// ---------------------------------------------------------------------------
// Advisory HTTP server
// ---------------------------------------------------------------------------
//
// Exposes live advisory fetches as resumable, request-id-keyed HTTP jobs.

pub mod jobs;
mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use state::AppState;

/// Configuration for the advisory server.
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_jobs: usize,
}

/// Build the axum Router (useful for testing).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/vulns", get(routes::vulns))
        .with_state(state)
}

/// Start the advisory server and block until shutdown (Ctrl+C).
pub async fn start_server(
    config: ServerConfig,
    source: Arc<dyn patchwatch_types::AdvisorySource>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::with_max_jobs(source, config.max_jobs));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    tracing::info!(addr = %config.listen_addr, "advisory server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("advisory server shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
