//! offcache server entry point.
//!
//! Loads configuration, opens the cache database, deploys the configured
//! version and serves the MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use offcache_client::{FetchClient, FetchConfig};
use offcache_core::{AppConfig, CacheDb};

mod clients;
mod controller;
mod handler;
mod registration;
mod tools;

#[cfg(test)]
mod testing;

use controller::{ControllerSettings, WorkerVersion};
use registration::Registration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, scope = %config.scope, tag = %config.generation_tag, "starting offcache server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = FetchClient::new(FetchConfig::from_app(&config))?;
    let settings = ControllerSettings::from_config(&config)?;
    let registration = Arc::new(Registration::new(settings, Arc::new(db), Arc::new(fetcher), config.skip_waiting));

    let version = WorkerVersion::from_config(&config);
    match registration.register(version.clone()).await {
        Ok(outcome) => tracing::info!(?outcome, "initial version registered"),
        Err(e) => {
            let serving = registration.active().await.map(|c| c.tag().to_string());
            tracing::warn!(error = %e, tag = %version.tag, serving = ?serving, "initial registration failed; retry with sw_register");
        }
    }

    let handler = handler::OffcacheServer::new(registration, version);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    Ok(())
}
