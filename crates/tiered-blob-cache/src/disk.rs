//! Persistent tier: one file per key plus a JSON manifest
//!
//! Manifest bookkeeping is serialized behind a single async mutex. Payloads
//! are written to temp files and read outside that lock. Only the renames
//! that publish or retire a file happen under it, together with the matching
//! record change, so the manifest always describes the files in place.
//! Retired files are deleted after the lock is released. Manifest
//! persistence is debounced: each mutation restarts a timer, and only the
//! last one in a burst writes the file.

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::manifest::{file_name_for_key, DiskCacheRecord, DiskManifest};
use crate::policy::EvictionPolicy;
use crate::types::{CacheItem, CacheStats};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// Capacity-bounded, TTL-aware file store
pub struct DiskTier {
    inner: Arc<Inner>,
}

struct Inner {
    directory: PathBuf,
    capacity: u64,
    /// `None` when the configured TTL does not fit a timestamp offset
    ttl: Option<chrono::Duration>,
    flush_interval: Duration,
    policy: Box<dyn EvictionPolicy>,
    clock: Arc<dyn Clock>,
    state: Mutex<DiskState>,
    /// Generation of the last manifest written to disk
    persisted: Mutex<u64>,
    temp_counter: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct DiskState {
    manifest: DiskManifest,
    dirty: bool,
    generation: u64,
    pending_flush: Option<JoinHandle<()>>,
}

impl DiskTier {
    /// Open the tier using the configured eviction policy
    pub async fn open(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open_with_policy(config, config.eviction_policy.build(), clock).await
    }

    /// Open the tier with a custom eviction policy.
    ///
    /// A missing or undecodable manifest yields an empty tier. Files in the
    /// directory that no record refers to are deleted, and a manifest that
    /// exceeds the (possibly reduced) capacity is trimmed.
    pub async fn open_with_policy(
        config: &CacheConfig,
        policy: Box<dyn EvictionPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let directory = config.disk_directory();
        fs::create_dir_all(&directory).await?;

        let manifest = match fs::read(directory.join(MANIFEST_FILE)).await {
            Ok(data) => DiskManifest::decode_or_empty(&data),
            Err(e) if e.kind() == ErrorKind::NotFound => DiskManifest::empty(),
            Err(e) => {
                warn!(error = %e, "Failed to read cache manifest, starting empty");
                DiskManifest::empty()
            }
        };

        let inner = Arc::new(Inner {
            directory,
            capacity: config.disk_capacity,
            ttl: chrono::Duration::from_std(config.default_ttl).ok(),
            flush_interval: config.manifest_flush_interval,
            policy,
            clock,
            state: Mutex::new(DiskState {
                manifest,
                dirty: false,
                generation: 0,
                pending_flush: None,
            }),
            persisted: Mutex::new(0),
            temp_counter: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        });

        inner.reconcile().await;

        let entries = inner.state.lock().await.manifest.len();
        info!(directory = ?inner.directory, entries, capacity = inner.capacity, "Disk cache opened");

        Ok(Self { inner })
    }

    /// Look up a key, treating `now` as the current time for expiry and
    /// recency. Expired or unreadable entries are purged and reported as
    /// misses.
    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheItem> {
        let inner = &self.inner;
        let mut retired = Vec::new();

        let record = {
            let mut state = inner.state.lock().await;
            let Some(record) = state.manifest.records.get(key).cloned() else {
                inner.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };

            if record.is_expired(now) {
                debug!(key, expires_at = ?record.expires_at, "Disk cache entry expired");
                inner.remove_locked(&mut state, key, &mut retired).await;
                inner.mark_dirty(&mut state);
                inner.misses.fetch_add(1, Ordering::Relaxed);
                drop(state);
                delete_files(retired).await;
                return None;
            }
            record
        };

        let path = inner.file_path(&record.file_name);
        let data = fs::read(&path).await;

        let mut state = inner.state.lock().await;
        let item = match data {
            Ok(data) => {
                if let Some(current) = state.manifest.records.get_mut(key) {
                    current.last_access_time = now;
                    current.access_count = current.access_count.saturating_add(1);
                    inner.mark_dirty(&mut state);
                }
                inner.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, size = data.len(), "Disk cache hit");
                Some(CacheItem::new(Bytes::from(data), record.expires_at))
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read cached file, removing entry");
                // A concurrent store may already have replaced the record
                if state.manifest.records.get(key) == Some(&record) {
                    inner.remove_locked(&mut state, key, &mut retired).await;
                    inner.mark_dirty(&mut state);
                }
                inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        };
        drop(state);

        delete_files(retired).await;
        item
    }

    /// Store a payload under `key`.
    ///
    /// Payloads larger than the tier and failed writes are dropped silently.
    pub async fn put(&self, key: &str, bytes: Bytes) {
        let inner = &self.inner;
        let size = bytes.len() as u64;

        if size > inner.capacity {
            debug!(key, size, capacity = inner.capacity, "Payload exceeds disk tier capacity");
            return;
        }

        let file_name = file_name_for_key(key);
        let temp = match inner.write_temp(&file_name, &bytes).await {
            Ok(temp) => temp,
            Err(e) => {
                warn!(key, error = %e, "Failed to write cache file");
                return;
            }
        };

        let mut retired = Vec::new();
        {
            let mut state = inner.state.lock().await;

            if let Err(e) = fs::rename(&temp, inner.file_path(&file_name)).await {
                drop(state);
                warn!(key, error = %e, "Failed to move cache file into place");
                let _ = fs::remove_file(&temp).await;
                return;
            }

            let now = inner.clock.now();
            let record = DiskCacheRecord {
                file_name,
                file_size: size,
                last_access_time: now,
                access_count: 1,
                expires_at: inner.ttl.and_then(|ttl| now.checked_add_signed(ttl)),
            };
            state.manifest.insert(key.to_string(), record);

            let evicted = inner.policy.keys_to_evict(&state.manifest, inner.capacity);
            for evicted_key in &evicted {
                inner.remove_locked(&mut state, evicted_key, &mut retired).await;
                debug!(key = %evicted_key, "Evicted disk cache entry");
            }

            inner.mark_dirty(&mut state);
            debug!(key, size, total_size = state.manifest.total_size, "Stored blob on disk");
        }

        delete_files(retired).await;
    }

    /// Remove one entry and its file
    pub async fn remove(&self, key: &str) {
        let mut retired = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            if self.inner.remove_locked(&mut state, key, &mut retired).await {
                self.inner.mark_dirty(&mut state);
            }
        }
        delete_files(retired).await;
    }

    /// Remove every entry and file
    pub async fn clear(&self) {
        let mut retired = Vec::new();
        let removed = {
            let mut state = self.inner.state.lock().await;
            let keys: Vec<String> = state.manifest.records.keys().cloned().collect();
            for key in &keys {
                self.inner.remove_locked(&mut state, key, &mut retired).await;
            }
            state.manifest = DiskManifest::empty();
            self.inner.mark_dirty(&mut state);
            keys.len()
        };
        delete_files(retired).await;
        info!(removed, "Disk cache cleared");
    }

    /// Write the manifest now if it has unpersisted changes
    pub async fn flush(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if let Some(handle) = state.pending_flush.take() {
                handle.abort();
            }
        }
        if self.inner.flush_if_dirty().await {
            let mut state = self.inner.state.lock().await;
            self.inner.schedule_flush(&mut state);
        }
    }

    /// Copy of the record for `key`, without touching its access bookkeeping
    pub async fn record(&self, key: &str) -> Option<DiskCacheRecord> {
        self.inner.state.lock().await.manifest.records.get(key).cloned()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock().await;
        CacheStats {
            entries: state.manifest.len(),
            total_size: state.manifest.total_size,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }
}

impl Inner {
    fn file_path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    fn manifest_path(&self) -> PathBuf {
        self.directory.join(MANIFEST_FILE)
    }

    /// Hidden sibling of `file_name`, unique per call
    fn scratch_path(&self, file_name: &str, suffix: &str) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.directory.join(format!(".{}.{}.{}", file_name, n, suffix))
    }

    /// Write `data` to a fresh temp file and return its path
    async fn write_temp(&self, file_name: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        let temp = self.scratch_path(file_name, "tmp");
        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(temp)
    }

    /// Drop the record for `key` and move its file out of the way.
    ///
    /// The moved file is pushed onto `retired` for deletion once the lock is
    /// released. Returns whether a record was removed.
    async fn remove_locked(
        &self,
        state: &mut DiskState,
        key: &str,
        retired: &mut Vec<PathBuf>,
    ) -> bool {
        let Some(record) = state.manifest.remove(key) else {
            return false;
        };

        let retired_path = self.scratch_path(&record.file_name, "del");
        match fs::rename(self.file_path(&record.file_name), &retired_path).await {
            Ok(()) => retired.push(retired_path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(key, error = %e, "Failed to retire cache file"),
        }
        true
    }

    /// Record a manifest change and restart the flush timer
    fn mark_dirty(self: &Arc<Self>, state: &mut DiskState) {
        state.dirty = true;
        state.generation += 1;
        self.schedule_flush(state);
    }

    fn schedule_flush(self: &Arc<Self>, state: &mut DiskState) {
        if let Some(handle) = state.pending_flush.take() {
            handle.abort();
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let delay = self.flush_interval;
        state.pending_flush = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.flush_if_dirty().await {
                    return;
                }
            }
        }));
    }

    /// Persist the manifest if it changed since the last write.
    ///
    /// Returns `true` when the write failed and no newer flush is scheduled
    /// to pick the changes up.
    async fn flush_if_dirty(&self) -> bool {
        let (snapshot, generation) = {
            let mut state = self.state.lock().await;
            if !state.dirty {
                return false;
            }
            state.dirty = false;
            // Detach rather than abort: this may be the running flush task itself
            state.pending_flush = None;
            (state.manifest.clone(), state.generation)
        };

        let mut persisted = self.persisted.lock().await;
        if *persisted >= generation {
            return false;
        }

        let data = match snapshot.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to encode cache manifest");
                return false;
            }
        };

        if let Err(e) = self.write_manifest(&data).await {
            warn!(error = %e, "Failed to write cache manifest");
            let mut state = self.state.lock().await;
            state.dirty = true;
            return state.pending_flush.is_none();
        }

        *persisted = generation;
        debug!(entries = snapshot.len(), total_size = snapshot.total_size, "Flushed cache manifest");
        false
    }

    async fn write_manifest(&self, data: &[u8]) -> std::io::Result<()> {
        let temp = self.write_temp(MANIFEST_FILE, data).await?;
        if let Err(e) = fs::rename(&temp, self.manifest_path()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Bring the loaded manifest and the directory back into agreement
    async fn reconcile(self: &Arc<Self>) {
        let mut retired = Vec::new();
        let mut state = self.state.lock().await;

        let known: HashSet<String> = state
            .manifest
            .records
            .values()
            .map(|r| r.file_name.clone())
            .collect();

        match fs::read_dir(&self.directory).await {
            Ok(mut dir) => {
                let mut swept = 0usize;
                while let Ok(Some(entry)) = dir.next_entry().await {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name == MANIFEST_FILE || known.contains(&name) {
                        continue;
                    }
                    if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                        retired.push(entry.path());
                        swept += 1;
                    }
                }
                if swept > 0 {
                    info!(swept, "Removing cache files missing from the manifest");
                }
            }
            Err(e) => warn!(error = %e, "Failed to scan cache directory"),
        }

        let evicted = self.policy.keys_to_evict(&state.manifest, self.capacity);
        for key in &evicted {
            self.remove_locked(&mut state, key, &mut retired).await;
        }
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "Trimmed disk cache to capacity");
            self.mark_dirty(&mut state);
        }
        drop(state);

        delete_files(retired).await;
    }
}

async fn delete_files(paths: Vec<PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(&path).await {
            debug!(path = ?path, error = %e, "Failed to delete retired cache file");
        }
    }
}
