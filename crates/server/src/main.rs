//! shelter proxy entry point.
//!
//! Loads configuration, installs and activates the configured cache
//! generation, then serves the proxy's MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shelter_client::{CacheProxy, FetchClient, FetchConfig, ProxySettings};
use shelter_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

/// Run both lifecycle hooks. A failed install leaves the previous
/// generation (if any) serving, so it is logged rather than fatal.
async fn bring_up(proxy: &CacheProxy) {
    if let Err(e) = proxy.on_install().await {
        tracing::warn!(error = %e, "install failed; continuing with the previous generation");
        return;
    }

    if let Err(e) = proxy.on_activate().await {
        tracing::warn!(error = %e, "activation failed; requests pass through to the origin");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let settings = ProxySettings::from_config(&config)?;

    tracing::info!(
        generation = %config.generation,
        origin = %config.origin,
        db_path = %config.db_path.display(),
        "starting shelter proxy on stdio transport"
    );

    let store = CacheDb::open(&config.db_path).await?;
    let origin = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let proxy = Arc::new(CacheProxy::new(store, origin, settings));

    bring_up(&proxy).await;

    let handler = handler::ShelterServer::new(proxy.clone());
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    proxy.settle().await;
    tracing::info!("shut down");

    Ok(())
}
