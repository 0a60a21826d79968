//! Memory + disk composition
//!
//! Reads go memory first, then disk; a disk hit warms memory. Writes land in
//! memory before `store` returns, while disk writes are queued to a single
//! background worker and never reported back to the caller.

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::disk::DiskTier;
use crate::error::Result;
use crate::memory::MemoryTier;
use crate::types::{CacheItem, TierStats};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum DiskJob {
    Store { key: String, bytes: Bytes },
    /// Completes once every job queued before it has run
    Barrier(oneshot::Sender<()>),
}

/// Read-through / write-through cache over a memory and a disk tier
pub struct CacheProvider {
    memory: MemoryTier,
    disk: Arc<DiskTier>,
    clock: Arc<dyn Clock>,
    disk_jobs: mpsc::Sender<DiskJob>,
}

impl CacheProvider {
    /// Build both tiers from configuration.
    ///
    /// Must be called from within a Tokio runtime: it spawns the disk writer.
    pub async fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let memory = MemoryTier::new(config.memory_capacity);
        let disk = DiskTier::open(config, clock.clone()).await?;
        Ok(Self::new(memory, disk, clock, config.disk_write_queue_depth))
    }

    /// Compose existing tiers. Must be called from within a Tokio runtime.
    pub fn new(
        memory: MemoryTier,
        disk: DiskTier,
        clock: Arc<dyn Clock>,
        queue_depth: usize,
    ) -> Self {
        let disk = Arc::new(disk);
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        tokio::spawn(run_disk_writer(disk.clone(), rx));

        Self {
            memory,
            disk,
            clock,
            disk_jobs: tx,
        }
    }

    /// Look up `key` in memory, then on disk
    pub async fn lookup(&self, key: &str) -> Option<CacheItem> {
        if let Some(item) = self.memory.get(key).await {
            debug!(key, "Memory cache hit");
            return Some(item);
        }

        let item = self.disk.get(key, self.clock.now()).await?;
        self.memory.put(key, item.bytes.clone()).await;
        Some(item)
    }

    /// Store `bytes` under `key`.
    ///
    /// Visible to `lookup` as soon as this returns. The disk copy is written
    /// later and dropped if the background queue is full.
    pub async fn store(&self, bytes: Bytes, key: &str) {
        self.memory.put(key, bytes.clone()).await;

        let job = DiskJob::Store {
            key: key.to_string(),
            bytes,
        };
        if let Err(e) = self.disk_jobs.try_send(job) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!(key, reason, "Dropped disk cache write");
        }
    }

    /// Drop `key` from both tiers
    pub async fn invalidate(&self, key: &str) {
        self.memory.remove(key).await;
        self.disk.remove(key).await;
    }

    /// Wait until all disk writes queued so far have been applied
    pub async fn drain_disk_writes(&self) {
        let (tx, rx) = oneshot::channel();
        if self.disk_jobs.send(DiskJob::Barrier(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Drain queued writes and persist the manifest
    pub async fn shutdown(&self) {
        self.drain_disk_writes().await;
        self.disk.flush().await;
    }

    pub async fn stats(&self) -> TierStats {
        TierStats {
            memory: self.memory.stats().await,
            disk: self.disk.stats().await,
        }
    }

    pub fn disk(&self) -> &DiskTier {
        &self.disk
    }
}

async fn run_disk_writer(disk: Arc<DiskTier>, mut jobs: mpsc::Receiver<DiskJob>) {
    while let Some(job) = jobs.recv().await {
        match job {
            DiskJob::Store { key, bytes } => disk.put(&key, bytes).await,
            DiskJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> CacheConfig {
        CacheConfig {
            memory_capacity: 1024,
            disk_capacity: 4096,
            default_ttl: Duration::from_secs(60),
            cache_root: root.to_path_buf(),
            namespace: "provider-test".to_string(),
            manifest_flush_interval: Duration::from_millis(20),
            ..CacheConfig::default()
        }
    }

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 11, 14, 12, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_lookup_before_store_is_none() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        assert!(provider.lookup("https://example.com/a.png").await.is_none());
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        provider
            .store(Bytes::from_static(b"remote-fetch"), "https://example.com/a.png")
            .await;
        let item = provider.lookup("https://example.com/a.png").await.unwrap();
        assert_eq!(item.bytes, Bytes::from_static(b"remote-fetch"));
    }

    #[tokio::test]
    async fn test_store_reaches_disk() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        provider.store(Bytes::from_static(b"bytes"), "k").await;
        provider.drain_disk_writes().await;

        let record = provider.disk().record("k").await.unwrap();
        assert_eq!(record.file_size, 5);
        assert_eq!(provider.stats().await.disk.entries, 1);
    }

    #[tokio::test]
    async fn test_memory_hit_skips_disk() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        provider.store(Bytes::from_static(b"memory"), "k").await;
        provider.drain_disk_writes().await;
        provider.lookup("k").await.unwrap();

        let stats = provider.stats().await;
        assert_eq!(stats.memory.hits, 1);
        assert_eq!(stats.disk.hits + stats.disk.misses, 0);
    }

    #[tokio::test]
    async fn test_disk_hit_warms_memory() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let clock = test_clock();

        let disk = DiskTier::open(&config, clock.clone()).await.unwrap();
        disk.put("k", Bytes::from_static(b"disk-hit")).await;
        let provider = CacheProvider::new(MemoryTier::new(1024), disk, clock, 8);

        let first = provider.lookup("k").await.unwrap();
        assert_eq!(first.bytes, Bytes::from_static(b"disk-hit"));
        assert!(first.expires_at.is_some());

        let second = provider.lookup("k").await.unwrap();
        assert_eq!(second.bytes, Bytes::from_static(b"disk-hit"));

        let stats = provider.stats().await;
        assert_eq!(stats.disk.hits, 1);
        assert_eq!(stats.memory.hits, 1);
    }

    #[tokio::test]
    async fn test_expired_disk_entry_is_miss() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let clock = test_clock();

        let disk = DiskTier::open(&config, clock.clone()).await.unwrap();
        disk.put("k", Bytes::from_static(b"stale")).await;
        let provider = CacheProvider::new(MemoryTier::new(1024), disk, clock.clone(), 8);

        clock.advance(chrono::Duration::seconds(61));
        assert!(provider.lookup("k").await.is_none());
        assert!(provider.disk().record("k").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        provider.store(Bytes::from_static(b"bytes"), "k").await;
        provider.drain_disk_writes().await;
        provider.invalidate("k").await;

        assert!(provider.lookup("k").await.is_none());
        assert!(provider.disk().record("k").await.is_none());
    }

    #[tokio::test]
    async fn test_payload_too_large_for_memory_still_reaches_disk() {
        let dir = tempdir().unwrap();
        let provider = CacheProvider::open(&test_config(dir.path()), test_clock())
            .await
            .unwrap();

        provider.store(Bytes::from(vec![7u8; 2048]), "big").await;
        provider.drain_disk_writes().await;

        let item = provider.lookup("big").await.unwrap();
        assert_eq!(item.bytes.len(), 2048);
        assert_eq!(provider.stats().await.disk.hits, 1);
    }

    #[tokio::test]
    async fn test_shutdown_persists_manifest() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        {
            let provider = CacheProvider::open(&config, test_clock()).await.unwrap();
            provider.store(Bytes::from_static(b"kept"), "k").await;
            provider.shutdown().await;
        }

        let provider = CacheProvider::open(&config, test_clock()).await.unwrap();
        let item = provider.lookup("k").await.unwrap();
        assert_eq!(item.bytes, Bytes::from_static(b"kept"));
    }
}
