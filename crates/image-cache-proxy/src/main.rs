//! Image Cache Proxy
//!
//! Serves images by source URL through a two-tier (memory + disk) cache,
//! fetching each missing image from its origin at most once at a time.

mod error;
mod media;
mod server;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use http_blob_fetcher::HttpFetcher;
use std::sync::Arc;
use tiered_blob_cache::{CacheProvider, FetchCoordinator, SystemClock};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_cache_proxy=info".parse()?)
        .add_directive("tiered_blob_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting image cache proxy...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache.disk_directory());
    info!(
        "Memory cache size: {} MB",
        config.cache.memory_capacity / (1024 * 1024)
    );
    info!(
        "Disk cache size: {} MB",
        config.cache.disk_capacity / (1024 * 1024)
    );
    info!("Cache TTL: {} seconds", config.cache.default_ttl.as_secs());
    info!("Eviction policy: {}", config.cache.eviction_policy);

    let cache = Arc::new(CacheProvider::open(&config.cache, Arc::new(SystemClock)).await?);
    let fetcher = Arc::new(HttpFetcher::with_config(&config.fetcher)?);
    let coordinator = FetchCoordinator::new(cache.clone(), fetcher);

    let state: SharedState = Arc::new(ServerState::new(coordinator, config.cache.default_ttl));

    start_server(state, config.port, shutdown_signal()).await?;

    info!("Persisting cache before exit");
    cache.shutdown().await;

    Ok(())
}

fn load_config() -> ProxyConfig {
    ProxyConfig::from_lookup(|name| std::env::var(name).ok())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
