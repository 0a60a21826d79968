//! Error types for the image cache proxy

use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Cache(tiered_blob_cache::CacheError),
    Fetcher(http_blob_fetcher::FetcherError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Cache(err) => write!(f, "Cache error: {}", err),
            ProxyError::Fetcher(err) => write!(f, "Fetcher error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Cache(err) => Some(err),
            ProxyError::Fetcher(err) => Some(err),
            ProxyError::Io(err) => Some(err.as_ref()),
            ProxyError::Config(_) => None,
        }
    }
}

impl From<tiered_blob_cache::CacheError> for ProxyError {
    fn from(err: tiered_blob_cache::CacheError) -> Self {
        ProxyError::Cache(err)
    }
}

impl From<http_blob_fetcher::FetcherError> for ProxyError {
    fn from(err: http_blob_fetcher::FetcherError) -> Self {
        ProxyError::Fetcher(err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
