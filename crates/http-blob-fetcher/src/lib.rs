//! HTTP Blob Fetcher
//!
//! Fetches raw bytes for a URL key over HTTP(S), reporting network failures,
//! timeouts and non-2xx responses as [`TransportError`]s.
//!
//! [`TransportError`]: tiered_blob_cache::TransportError

pub mod error;
pub mod fetcher;

pub use error::{FetcherError, Result};
pub use fetcher::{FetcherConfig, HttpFetcher};
