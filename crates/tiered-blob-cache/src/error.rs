//! Error types for the tiered blob cache

use std::fmt;

/// Errors raised while setting up the cache.
///
/// Once constructed, no cache operation fails: I/O and corruption problems are
/// healed in place and surface as cache misses.
#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Failure reported by a remote byte source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The source answered with a non-2xx status
    Status(u16),
    Timeout,
    Connection(String),
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Status(code) => write!(f, "Remote returned status {}", code),
            TransportError::Timeout => write!(f, "Remote request timed out"),
            TransportError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Other(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}
