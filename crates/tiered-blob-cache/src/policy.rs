//! Disk eviction policies
//!
//! A policy only picks keys; the disk tier performs the removal. Policies fire
//! only when the manifest's total size exceeds the capacity, and then return
//! the shortest prefix of their ordering that brings the size back within it.

use crate::manifest::{DiskCacheRecord, DiskManifest};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub trait EvictionPolicy: Send + Sync {
    fn keys_to_evict(&self, manifest: &DiskManifest, capacity: u64) -> Vec<String>;
}

/// Least recently used: oldest `last_access_time` first
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn keys_to_evict(&self, manifest: &DiskManifest, capacity: u64) -> Vec<String> {
        evict_in_order(manifest, capacity, |(ka, a), (kb, b)| {
            a.last_access_time
                .cmp(&b.last_access_time)
                .then_with(|| ka.cmp(kb))
        })
    }
}

/// Least frequently used: lowest `access_count` first, then oldest access
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuPolicy;

impl EvictionPolicy for LfuPolicy {
    fn keys_to_evict(&self, manifest: &DiskManifest, capacity: u64) -> Vec<String> {
        evict_in_order(manifest, capacity, |(ka, a), (kb, b)| {
            a.access_count
                .cmp(&b.access_count)
                .then_with(|| a.last_access_time.cmp(&b.last_access_time))
                .then_with(|| ka.cmp(kb))
        })
    }
}

fn evict_in_order<F>(manifest: &DiskManifest, capacity: u64, compare: F) -> Vec<String>
where
    F: Fn((&String, &DiskCacheRecord), (&String, &DiskCacheRecord)) -> Ordering,
{
    if manifest.total_size <= capacity {
        return Vec::new();
    }

    let mut candidates: Vec<(&String, &DiskCacheRecord)> = manifest.records.iter().collect();
    candidates.sort_by(|a, b| compare(*a, *b));

    let mut remaining = manifest.total_size;
    let mut evicted = Vec::new();
    for (key, record) in candidates {
        if remaining <= capacity {
            break;
        }
        evicted.push(key.clone());
        remaining = remaining.saturating_sub(record.file_size);
    }
    evicted
}

/// Policy selection for configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolicyKind {
    #[default]
    Lru,
    Lfu,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            PolicyKind::Lru => Box::new(LruPolicy),
            PolicyKind::Lfu => Box::new(LfuPolicy),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Lru => write!(f, "lru"),
            PolicyKind::Lfu => write!(f, "lfu"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = crate::error::CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(PolicyKind::Lru),
            "lfu" => Ok(PolicyKind::Lfu),
            other => Err(crate::error::CacheError::Config(format!(
                "Unknown eviction policy: {}",
                other
            ))),
        }
    }
}
