//! The remote byte source consumed on cache misses

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Fetch the bytes identified by `key` (a URL)
    async fn fetch(&self, key: &str) -> Result<Bytes, TransportError>;
}
