use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use svarflyt_core::config::GatewayConfig;

use crate::routes;
use crate::state::AppState;

/// Build the HTTP router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(routes::chat))
        .route("/chat/stream", post(routes::chat_stream))
        .route("/api/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Probe the query backend until it reports healthy, then mark the
/// gateway ready. Stops early on shutdown.
pub fn spawn_readiness_probe(
    state: Arc<AppState>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match state.collaborators.query_engine.health().await {
                Ok(()) => {
                    state.mark_ready();
                    info!("Indexes loaded, accepting chat requests");
                    return;
                }
                Err(e) => debug!(error = %e, "Query backend not ready yet"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    })
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    probe_interval: Duration,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, state: Arc<AppState>, probe_interval: Duration) -> Self {
        Self {
            config,
            state,
            probe_interval,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let probe = spawn_readiness_probe(self.state.clone(), self.probe_interval, shutdown.clone());
        info!("Scheduled index readiness probe");

        let app = router(self.state.clone());
        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        probe.abort();
        info!("Gateway shut down");
        Ok(())
    }
}
