use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{Cache, CacheError};
use crate::cache::value::NEVER_DIE;
use crate::cluster::ClusterNode;

/// HTTP rendition of the cache surface: the same four operations as the
/// binary protocol, plus the member listing. TTL rides in the `Ttl` request
/// header, in seconds.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
    pub node: Arc<ClusterNode>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/cache/:key",
            get(get_handler).put(set_handler).delete(delete_handler),
        )
        .route("/v1/status", get(status_handler))
        .route("/v1/nodes", get(nodes_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str, shutdown: CancellationToken) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

/// Key-addressed requests are served locally only when this node owns the
/// key; otherwise the client is pointed at the owner with a 307 whose
/// `Location` is the owner's address followed by the original URI.
fn check_owner(state: &AppState, key: &[u8], uri: &Uri) -> Option<Response> {
    match state.node.owner_of(key) {
        Ok(owner) if state.node.is_self(&owner) => None,
        Ok(owner) => {
            debug!("redirecting {} to {}", uri, owner);
            let location = format!("{}{}", owner, uri);
            Some((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response())
        }
        Err(_) => Some(StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    }
}

async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    if let Some(response) = check_owner(&state, key.as_bytes(), &uri) {
        return response;
    }
    match state.cache.get(key.as_bytes()).await {
        Some(value) => value.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(response) = check_owner(&state, key.as_bytes(), &uri) {
        return response;
    }
    let ttl = match ttl_of(&headers) {
        Some(ttl) => ttl,
        None => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    match state.cache.set_with_ttl(key.as_bytes(), &body, ttl).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err @ CacheError::EntryTooLarge) => {
            (StatusCode::PAYLOAD_TOO_LARGE, format!("Error: {}", err)).into_response()
        }
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", err)).into_response()
        }
    }
}

/// TTL from the `Ttl` header; absent means never expires, unparseable is an
/// error the caller maps to 500.
fn ttl_of(headers: &HeaderMap) -> Option<u64> {
    match headers.get("Ttl") {
        None => Some(NEVER_DIE),
        Some(raw) => raw.to_str().ok()?.parse().ok(),
    }
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    uri: Uri,
) -> Response {
    if let Some(response) = check_owner(&state, key.as_bytes(), &uri) {
        return response;
    }
    state.cache.delete(key.as_bytes()).await;
    StatusCode::OK.into_response()
}

async fn status_handler(State(state): State<AppState>) -> Response {
    Json(state.cache.status().await).into_response()
}

async fn nodes_handler(State(state): State<AppState>) -> Response {
    Json(state.node.members()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::cluster::SeedMembership;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    const SELF_ADDR: &str = "127.0.0.1:5837";

    fn test_state(options: CacheOptions) -> AppState {
        let membership = Arc::new(SeedMembership::new(SELF_ADDR.to_string(), &[]));
        AppState {
            cache: Arc::new(Cache::with_options(options).unwrap()),
            node: ClusterNode::new(SELF_ADDR.to_string(), 16, 3, membership),
        }
    }

    fn test_options() -> CacheOptions {
        CacheOptions {
            dump_file: std::path::PathBuf::from("rcache-http-test-missing.dump"),
            ..CacheOptions::default()
        }
    }

    fn put_request(key: &str, body: &'static [u8], ttl: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("PUT")
            .uri(format!("/v1/cache/{}", key));
        if let Some(ttl) = ttl {
            builder = builder.header("Ttl", ttl);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(key: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/v1/cache/{}", key))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let app = router(test_state(test_options()));

        let stored = app
            .clone()
            .oneshot(put_request("foo", b"bar", None))
            .await
            .unwrap();
        assert_eq!(stored.status(), StatusCode::CREATED);

        let fetched = app.oneshot(get_request("foo")).await.unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        let body = to_bytes(fetched.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"bar"));
    }

    #[tokio::test]
    async fn get_miss_is_404() {
        let app = router(test_state(test_options()));
        let response = app.oneshot(get_request("missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let app = router(test_state(test_options()));

        app.clone()
            .oneshot(put_request("foo", b"bar", None))
            .await
            .unwrap();
        let deleted = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/cache/foo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let fetched = app.oneshot(get_request("foo")).await.unwrap();
        assert_eq!(fetched.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn capacity_overflow_is_413() {
        let app = router(test_state(CacheOptions {
            max_entry_size: 1,
            shard_count: 1,
            ..test_options()
        }));

        let first = app
            .clone()
            .oneshot(put_request("a", b"", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(put_request("b", b"", None)).await.unwrap();
        assert_eq!(second.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            body,
            Bytes::from_static(b"Error: the entry size will exceed if you set this entry")
        );
    }

    #[tokio::test]
    async fn unparseable_ttl_is_500() {
        let app = router(test_state(test_options()));
        let response = app
            .oneshot(put_request("foo", b"bar", Some("soon")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn status_reports_the_aggregate() {
        let app = router(test_state(test_options()));

        app.clone()
            .oneshot(put_request("foo", b"bar", None))
            .await
            .unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"count":1,"keyBytes":3,"valueBytes":3}"#);
    }

    #[tokio::test]
    async fn nodes_lists_the_membership() {
        let app = router(test_state(test_options()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/nodes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"["127.0.0.1:5837"]"#);
    }

    #[tokio::test]
    async fn foreign_keys_redirect_to_their_owner() {
        let membership = Arc::new(SeedMembership::new(SELF_ADDR.to_string(), &[]));
        let state = AppState {
            cache: Arc::new(Cache::with_options(test_options()).unwrap()),
            node: ClusterNode::new(SELF_ADDR.to_string(), 128, 3, membership.clone()),
        };
        membership.update(vec![SELF_ADDR.to_string(), "10.0.0.2:5837".to_string()]);
        state.node.update_ring();

        // Find a key the peer owns.
        let foreign = (0..1024u32)
            .map(|i| format!("key-{}", i))
            .find(|key| {
                let owner = state.node.owner_of(key.as_bytes()).unwrap();
                !state.node.is_self(&owner)
            })
            .expect("some key must hash to the peer");

        let app = router(state);
        let response = app.oneshot(get_request(&foreign)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION].to_str().unwrap(),
            format!("10.0.0.2:5837/v1/cache/{}", foreign)
        );
    }
}
