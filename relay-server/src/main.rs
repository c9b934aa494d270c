mod config;
mod error;
mod routes;
mod server;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::RelayServerConfig::from_env_or_default()?;
    tracing::info!(?config, "Loaded relay configuration");

    server::serve(config).await
}
