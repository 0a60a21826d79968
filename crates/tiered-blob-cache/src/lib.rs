//! Two-tier blob cache with TTL expiration, LRU eviction and request coalescing
//!
//! A bounded in-memory tier sits in front of a persistent on-disk tier that
//! tracks its files in a JSON manifest. [`FetchCoordinator`] resolves keys
//! (URLs) through both tiers and, on a miss, issues at most one remote fetch
//! per key no matter how many callers are waiting for it.

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod disk;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod policy;
pub mod provider;
pub mod remote;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use coordinator::{FetchCoordinator, Resolution};
pub use disk::DiskTier;
pub use error::{CacheError, Result, TransportError};
pub use manifest::{file_name_for_key, DiskCacheRecord, DiskManifest};
pub use memory::MemoryTier;
pub use policy::{EvictionPolicy, LfuPolicy, LruPolicy, PolicyKind};
pub use provider::CacheProvider;
pub use remote::RemoteFetch;
pub use types::{CacheItem, CacheStats, TierStats};
