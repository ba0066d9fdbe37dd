//! WebSocket dispatch server.

use anyhow::Result;
use dispatch_server::config::Config;
use dispatch_server::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        max_clients = config.max_clients,
        endpoints = config.endpoint_urls.len(),
        "starting dispatch-server"
    );

    server::run(config).await
}
