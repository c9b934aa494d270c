//! Server assembly: shared state, router and the serve loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::RelayServerConfig;
use crate::routes;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Upstream HTTP client. No overall request timeout: relayed segment
    /// bodies are long-lived streams and must not be cut off mid-transfer.
    pub client: reqwest::Client,
    pub config: Arc<RelayServerConfig>,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<RelayServerConfig>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .pool_max_idle_per_host(20)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            start_time: Instant::now(),
        }
    }
}

/// Build the application router with request tracing.
pub fn build_app(config: Arc<RelayServerConfig>) -> Router {
    let state = AppState::new(config);
    routes::create_router(state).layer(TraceLayer::new_for_http())
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: RelayServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    let app = build_app(Arc::new(config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Relay server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
