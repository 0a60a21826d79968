//! Core types for the image cache proxy

use http_blob_fetcher::FetcherConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tiered_blob_cache::{CacheConfig, PolicyKind, TierStats};

/// Configuration for the proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache: CacheConfig,
    pub fetcher: FetcherConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cache: CacheConfig {
                cache_root: PathBuf::from("./cache"),
                ..CacheConfig::default()
            },
            fetcher: FetcherConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Build a configuration from a variable lookup, falling back to the
    /// default for anything missing or unparsable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let cache = CacheConfig {
            memory_capacity: parsed("MEMORY_CACHE_SIZE").unwrap_or(defaults.cache.memory_capacity),
            disk_capacity: parsed("DISK_CACHE_SIZE").unwrap_or(defaults.cache.disk_capacity),
            default_ttl: parsed("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.default_ttl),
            cache_root: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache.cache_root),
            namespace: lookup("CACHE_NAMESPACE").unwrap_or(defaults.cache.namespace),
            manifest_flush_interval: parsed("MANIFEST_FLUSH_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache.manifest_flush_interval),
            eviction_policy: lookup("EVICTION_POLICY")
                .and_then(|s| s.parse::<PolicyKind>().ok())
                .unwrap_or(defaults.cache.eviction_policy),
            disk_write_queue_depth: defaults.cache.disk_write_queue_depth,
        };

        let fetcher = FetcherConfig {
            timeout: parsed("FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetcher.timeout),
            ..defaults.fetcher
        };

        Self {
            port,
            cache,
            fetcher,
        }
    }
}

/// Query string of the image endpoint
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub in_flight: usize,
    pub cache: TierStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
