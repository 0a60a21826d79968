//! Cache-first resolution with request coalescing
//!
//! On a miss the first caller for a key spawns the remote fetch as its own
//! task and records a shared handle to it. Later callers for the same key
//! await that handle instead of fetching again. The task stores the result,
//! then removes its in-flight entry, whatever the outcome. Because it runs
//! independently, callers that stop waiting do not cancel it.

use crate::provider::CacheProvider;
use crate::remote::RemoteFetch;
use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

type SharedFetch = Shared<BoxFuture<'static, Option<Bytes>>>;
type InFlight = Arc<Mutex<HashMap<String, SharedFetch>>>;

/// Bytes returned by [`FetchCoordinator::fetch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub bytes: Bytes,
    /// `true` when served by the memory or disk tier
    pub from_cache: bool,
}

pub struct FetchCoordinator {
    cache: Arc<CacheProvider>,
    remote: Arc<dyn RemoteFetch>,
    in_flight: InFlight,
}

impl FetchCoordinator {
    pub fn new(cache: Arc<CacheProvider>, remote: Arc<dyn RemoteFetch>) -> Self {
        Self {
            cache,
            remote,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Bytes for `key` from cache or remote; `None` if the remote fails
    pub async fn resolve(&self, key: &str) -> Option<Bytes> {
        self.fetch(key).await.map(|resolution| resolution.bytes)
    }

    /// Like [`resolve`](Self::resolve), also reporting whether the cache
    /// answered
    pub async fn fetch(&self, key: &str) -> Option<Resolution> {
        if let Some(item) = self.cache.lookup(key).await {
            return Some(Resolution {
                bytes: item.bytes,
                from_cache: true,
            });
        }

        let pending = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(existing) => {
                    debug!(key, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    // The task cannot remove its entry before we insert it:
                    // removal needs the lock held here.
                    let task = tokio::spawn(fetch_and_store(
                        key.to_string(),
                        self.cache.clone(),
                        self.remote.clone(),
                        self.in_flight.clone(),
                    ));
                    let shared = async move { task.await.ok().flatten() }.boxed().shared();
                    in_flight.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        pending.await.map(|bytes| Resolution {
            bytes,
            from_cache: false,
        })
    }

    /// Number of keys with a remote fetch outstanding
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    pub fn cache(&self) -> &CacheProvider {
        &self.cache
    }
}

async fn fetch_and_store(
    key: String,
    cache: Arc<CacheProvider>,
    remote: Arc<dyn RemoteFetch>,
    in_flight: InFlight,
) -> Option<Bytes> {
    debug!(key = %key, "Fetching from remote");

    let outcome = AssertUnwindSafe(async {
        match remote.fetch(&key).await {
            Ok(bytes) => {
                cache.store(bytes.clone(), &key).await;
                debug!(key = %key, size = bytes.len(), "Fetched and cached");
                Some(bytes)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Remote fetch failed");
                None
            }
        }
    })
    .catch_unwind()
    .await
    .unwrap_or_else(|_| {
        error!(key = %key, "Remote fetch panicked");
        None
    });

    in_flight.lock().await.remove(&key);
    outcome
}
