//! Cache configuration

use crate::error::{CacheError, Result};
use crate::policy::PolicyKind;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by both tiers
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory tier limit in bytes
    pub memory_capacity: u64,
    /// Disk tier limit in bytes
    pub disk_capacity: u64,
    /// Lifetime of a disk record, counted from its store time
    pub default_ttl: Duration,
    /// Parent directory of the namespace directory
    pub cache_root: PathBuf,
    /// Name of the directory holding this cache's files and manifest
    pub namespace: String,
    /// Debounce interval for manifest writes
    pub manifest_flush_interval: Duration,
    pub eviction_policy: PolicyKind,
    /// Number of disk writes that may wait in the background queue
    pub disk_write_queue_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 20 * 1024 * 1024, // 20MB
            disk_capacity: 100 * 1024 * 1024,  // 100MB
            default_ttl: Duration::from_secs(6 * 60 * 60),
            cache_root: PathBuf::from("./cache"),
            namespace: "image-cache".to_string(),
            manifest_flush_interval: Duration::from_secs(1),
            eviction_policy: PolicyKind::Lru,
            disk_write_queue_depth: 256,
        }
    }
}

impl CacheConfig {
    /// Directory holding the disk tier's files
    pub fn disk_directory(&self) -> PathBuf {
        self.cache_root.join(&self.namespace)
    }

    pub fn validate(&self) -> Result<()> {
        let ns = self.namespace.as_str();
        if ns.is_empty() || ns == "." || ns == ".." || ns.contains(['/', '\\']) {
            return Err(CacheError::Config(format!(
                "Invalid cache namespace: {:?}",
                self.namespace
            )));
        }
        if self.disk_write_queue_depth == 0 {
            return Err(CacheError::Config(
                "Disk write queue depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
