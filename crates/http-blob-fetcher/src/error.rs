//! Error types for the HTTP blob fetcher

use std::fmt;
use tiered_blob_cache::TransportError;

#[derive(Debug)]
pub enum FetcherError {
    /// The HTTP client could not be constructed
    Client(Box<reqwest::Error>),
}

impl fmt::Display for FetcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetcherError::Client(err) => write!(f, "HTTP client error: {}", err),
        }
    }
}

impl std::error::Error for FetcherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetcherError::Client(err) => Some(err.as_ref()),
        }
    }
}

impl From<reqwest::Error> for FetcherError {
    fn from(err: reqwest::Error) -> Self {
        FetcherError::Client(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FetcherError>;

/// Classify a request failure for the cache layer
pub(crate) fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_error_display() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        let err = FetcherError::from(err);
        assert!(format!("{}", err).starts_with("HTTP client error:"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_invalid_url_is_other_transport_error() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        assert!(matches!(transport_error(err), TransportError::Other(_)));
    }
}
