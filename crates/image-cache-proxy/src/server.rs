//! HTTP server for the image cache
//!
//! Provides /health and /image?url=... endpoints.

use crate::media::sniff_content_type;
use crate::types::{ErrorResponse, HealthResponse, ImageQuery};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tiered_blob_cache::FetchCoordinator;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use url::Url;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared state for the HTTP server
pub struct ServerState {
    pub coordinator: FetchCoordinator,
    /// Advertised to clients through Cache-Control
    pub max_age: Duration,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(coordinator: FetchCoordinator, max_age: Duration) -> Self {
        Self {
            coordinator,
            max_age,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/image", get(get_image))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(state: SharedState, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache = state.coordinator.cache().stats().await;
    let in_flight = state.coordinator.in_flight_count().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        in_flight,
        cache,
    })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Get an image by its source URL
async fn get_image(State(state): State<SharedState>, Query(query): Query<ImageQuery>) -> Response {
    let Some(raw) = query.url else {
        return error_response(StatusCode::BAD_REQUEST, "Missing url parameter");
    };

    let url = match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            debug!(url = %raw, scheme = url.scheme(), "Rejected unsupported scheme");
            return error_response(StatusCode::BAD_REQUEST, "Only http and https URLs are supported");
        }
        Err(e) => {
            debug!(url = %raw, error = %e, "Rejected invalid url");
            return error_response(StatusCode::BAD_REQUEST, "Invalid url parameter");
        }
    };

    match state.coordinator.fetch(url.as_str()).await {
        Some(resolution) => {
            let cache_header = if resolution.from_cache { "HIT" } else { "MISS" };
            let content_type = sniff_content_type(&resolution.bytes);

            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (
                        header::CACHE_CONTROL,
                        format!("public, max-age={}", state.max_age.as_secs()),
                    ),
                    (X_CACHE, cache_header.to_string()),
                ],
                Body::from(resolution.bytes),
            )
                .into_response()
        }
        None => {
            warn!(url = %url, "Failed to resolve image");
            error_response(StatusCode::NOT_FOUND, "Image not found")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tiered_blob_cache::{CacheConfig, CacheProvider, RemoteFetch, SystemClock, TransportError};
    use tower::ServiceExt;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    struct FakeRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteFetch for FakeRemote {
        async fn fetch(&self, key: &str) -> Result<Bytes, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key.contains("missing") {
                Err(TransportError::Status(404))
            } else {
                Ok(Bytes::from_static(PNG))
            }
        }
    }

    async fn create_test_state(root: &Path) -> (SharedState, Arc<FakeRemote>) {
        let config = CacheConfig {
            cache_root: root.to_path_buf(),
            namespace: "proxy-test".to_string(),
            ..CacheConfig::default()
        };
        let cache = CacheProvider::open(&config, Arc::new(SystemClock)).await.unwrap();
        let remote = Arc::new(FakeRemote {
            calls: AtomicUsize::new(0),
        });
        let coordinator = FetchCoordinator::new(Arc::new(cache), remote.clone());
        let state = Arc::new(ServerState::new(coordinator, Duration::from_secs(3600)));
        (state, remote)
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let (state, _) = create_test_state(dir.path()).await;
        let router = create_router(state);

        let response = get(&router, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["in_flight"], 0);
        assert!(json["cache"]["memory"]["entries"].as_u64().is_some());
        assert!(json["cache"]["disk"]["total_size"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_image_miss_then_hit() {
        let dir = tempdir().unwrap();
        let (state, remote) = create_test_state(dir.path()).await;
        let router = create_router(state);
        let uri = "/image?url=https%3A%2F%2Fexample.com%2Fcover.png";

        let first = get(&router, uri).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-cache"], "MISS");
        assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(first.headers()[header::CACHE_CONTROL], "public, max-age=3600");
        let body = axum::body::to_bytes(first.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], PNG);

        let second = get(&router, uri).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()["x-cache"], "HIT");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_missing_url_parameter() {
        let dir = tempdir().unwrap();
        let (state, _) = create_test_state(dir.path()).await;
        let router = create_router(state);

        assert_eq!(get(&router, "/image").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_image_rejects_bad_urls() {
        let dir = tempdir().unwrap();
        let (state, remote) = create_test_state(dir.path()).await;
        let router = create_router(state);

        let response = get(&router, "/image?url=not%20a%20url").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(&router, "/image?url=file%3A%2F%2F%2Fetc%2Fpasswd").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_not_found() {
        let dir = tempdir().unwrap();
        let (state, _) = create_test_state(dir.path()).await;
        let router = create_router(state);

        let response = get(&router, "/image?url=https%3A%2F%2Fexample.com%2Fmissing.png").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Image not found");
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let (state, _) = create_test_state(dir.path()).await;

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
