//! Persisted index of disk-resident entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Metadata for one file in the disk tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheRecord {
    pub file_name: String,
    pub file_size: u64,
    pub last_access_time: DateTime<Utc>,
    pub access_count: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DiskCacheRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// Total tracked size plus one record per key.
///
/// `total_size` equals the sum of all record sizes whenever the manifest is
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskManifest {
    pub total_size: u64,
    pub records: HashMap<String, DiskCacheRecord>,
}

impl DiskManifest {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a manifest, falling back to an empty one on any error
    pub fn decode_or_empty(data: &[u8]) -> Self {
        match serde_json::from_slice::<DiskManifest>(data) {
            Ok(mut manifest) => {
                manifest.recompute_total_size();
                manifest
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable cache manifest");
                Self::empty()
            }
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Insert or replace the record for `key`, keeping `total_size` in step.
    ///
    /// Returns the superseded record, if any.
    pub fn insert(&mut self, key: String, record: DiskCacheRecord) -> Option<DiskCacheRecord> {
        let size = record.file_size;
        let previous = self.records.insert(key, record);
        if let Some(previous) = &previous {
            self.total_size = self.total_size.saturating_sub(previous.file_size);
        }
        self.total_size = self.total_size.saturating_add(size);
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<DiskCacheRecord> {
        let record = self.records.remove(key)?;
        self.total_size = self.total_size.saturating_sub(record.file_size);
        Some(record)
    }

    pub fn recompute_total_size(&mut self) {
        self.total_size = self.records.values().map(|r| r.file_size).sum();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Derive the on-disk file name for a key: lowercase hex SHA-256
pub fn file_name_for_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
