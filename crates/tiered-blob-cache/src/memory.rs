//! Cost-bounded in-process tier

use crate::types::{CacheItem, CacheStats};
use bytes::Bytes;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Volatile key → bytes store bounded by total payload size.
///
/// Items never expire here; they live until evicted by weight or removed.
pub struct MemoryTier {
    cache: Cache<String, Bytes>,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryTier {
    /// Create a tier holding at most `capacity` bytes of payload
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .weigher(|_key: &String, value: &Bytes| -> u32 {
                u32::try_from(value.len()).unwrap_or(u32::MAX)
            })
            .build();

        Self {
            cache,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheItem> {
        match self.cache.get(key).await {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(CacheItem::new(bytes, None))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload; payloads larger than the whole tier are skipped
    pub async fn put(&self, key: &str, bytes: Bytes) {
        if bytes.len() as u64 > self.capacity {
            debug!(key, size = bytes.len(), capacity = self.capacity, "Payload exceeds memory tier capacity");
            return;
        }
        self.cache.insert(key.to_string(), bytes).await;
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            entries: self.cache.entry_count() as usize,
            total_size: self.cache.weighted_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let tier = MemoryTier::new(1024);
        assert!(tier.get("k").await.is_none());

        tier.put("k", Bytes::from_static(b"hello")).await;
        let item = tier.get("k").await.unwrap();
        assert_eq!(item.bytes, Bytes::from_static(b"hello"));
        assert!(item.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_skipped() {
        let tier = MemoryTier::new(4);
        tier.put("k", Bytes::from_static(b"too large")).await;
        assert!(tier.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let tier = MemoryTier::new(1024);
        tier.put("a", Bytes::from_static(b"a")).await;
        tier.put("b", Bytes::from_static(b"b")).await;

        tier.remove("a").await;
        assert!(tier.get("a").await.is_none());
        assert!(tier.get("b").await.is_some());

        tier.clear();
        assert!(tier.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_weight_stays_within_capacity() {
        let tier = MemoryTier::new(100);
        for i in 0..20 {
            tier.put(&format!("k{}", i), Bytes::from(vec![0u8; 30])).await;
        }

        let stats = tier.stats().await;
        assert!(stats.total_size <= 100);
    }

    #[tokio::test]
    async fn test_hit_miss_counters() {
        let tier = MemoryTier::new(1024);
        tier.get("missing").await;
        tier.put("k", Bytes::from_static(b"data")).await;
        tier.get("k").await;

        let stats = tier.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, 4);
    }
}
