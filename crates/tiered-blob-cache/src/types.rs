//! Cache types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload as returned by a tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub bytes: Bytes,
    /// `None` means the item does not expire via this field
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheItem {
    pub fn new(bytes: Bytes, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { bytes, expires_at }
    }
}

/// Statistics about a single tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Statistics for both tiers of a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierStats {
    pub memory: CacheStats,
    pub disk: CacheStats,
}
