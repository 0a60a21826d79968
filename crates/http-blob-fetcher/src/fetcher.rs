//! HTTP implementation of the remote byte source

use crate::error::{transport_error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tiered_blob_cache::{RemoteFetch, TransportError};
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = "http-blob-fetcher/0.1";

/// Client settings
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Responses larger than this are rejected
    pub max_body_size: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_size: Some(50 * 1024 * 1024), // 50MB
        }
    }
}

/// HTTP client fetching blobs by URL
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_size: Option<u64>,
}

impl HttpFetcher {
    /// Create a fetcher with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(&FetcherConfig::default())
    }

    pub fn with_config(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            max_body_size: config.max_body_size,
        })
    }

    fn check_size(&self, url: &str, size: u64) -> std::result::Result<(), TransportError> {
        match self.max_body_size {
            Some(limit) if size > limit => {
                warn!(url, size, limit, "Blob exceeds maximum body size");
                Err(TransportError::Other(format!(
                    "body of {} bytes exceeds limit of {} bytes",
                    size, limit
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteFetch for HttpFetcher {
    async fn fetch(&self, key: &str) -> std::result::Result<Bytes, TransportError> {
        debug!(url = %key, "Fetching blob");

        let response = self.client.get(key).send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %key, "Failed to fetch blob");
            return Err(TransportError::Status(response.status().as_u16()));
        }

        if let Some(length) = response.content_length() {
            self.check_size(key, length)?;
        }

        let data = response.bytes().await.map_err(transport_error)?;
        self.check_size(key, data.len() as u64)?;

        debug!(url = %key, size = data.len(), "Fetched blob");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve() -> String {
        let router = Router::new()
            .route("/image.png", get(|| async { &b"\x89PNG fake image"[..] }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/large", get(|| async { vec![0u8; 1024] }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = serve().await;
        let fetcher = HttpFetcher::new().unwrap();

        let data = fetcher.fetch(&format!("{}/image.png", base)).await.unwrap();
        assert_eq!(&data[..], b"\x89PNG fake image");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let base = serve().await;
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher.fetch(&format!("{}/missing", base)).await.unwrap_err();
        assert_eq!(err, TransportError::Status(404));

        let err = fetcher.fetch(&format!("{}/broken", base)).await.unwrap_err();
        assert_eq!(err, TransportError::Status(500));
    }

    #[tokio::test]
    async fn test_timeout() {
        let base = serve().await;
        let fetcher = HttpFetcher::with_config(&FetcherConfig {
            timeout: Duration::from_millis(200),
            ..FetcherConfig::default()
        })
        .unwrap();

        let err = fetcher.fetch(&format!("{}/slow", base)).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_body_size_limit() {
        let base = serve().await;
        let fetcher = HttpFetcher::with_config(&FetcherConfig {
            max_body_size: Some(100),
            ..FetcherConfig::default()
        })
        .unwrap();

        let err = fetcher.fetch(&format!("{}/large", base)).await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("http://{}/image.png", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
