//! HTTP API integration tests.
//!
//! Tests verify:
//! - Cached tiles are served with sniffed content type and cache headers
//! - Job control endpoints: start, progress, cancel, clear
//! - Error responses carry the JSON error body and the right status

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tilestash::{
    create_router, CacheManager, JobOptions, JobState, MemoryTileStore, RouterConfig,
};

use super::test_utils::{london_bbox, manager_with, wait_until, MockFetcher, PNG_MAGIC};

fn router_for(manager: Arc<CacheManager>) -> Router {
    create_router(
        manager,
        RouterConfig::default()
            .with_cache_max_age(600)
            .with_tracing(false),
    )
}

fn setup() -> (Arc<CacheManager>, Arc<MockFetcher>, Router) {
    let fetcher = Arc::new(MockFetcher::new());
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        fetcher.clone(),
        JobOptions::default(),
    );
    let router = router_for(manager.clone());
    (manager, fetcher, router)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

// =============================================================================
// Tile Serving
// =============================================================================

#[tokio::test]
async fn test_serves_cached_tile() {
    let (manager, _, router) = setup();
    manager.cache_area(london_bbox(), &[15]).await.unwrap();

    let request = Request::builder()
        .uri("/tiles/15/16372/10895.png")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=600"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.starts_with(PNG_MAGIC));

    // Extension is optional.
    let (status, _) = send(&router, Method::GET, "/tiles/15/16372/10895", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_uncached_tile_is_not_found() {
    let (_, _, router) = setup();

    let (status, body) = send(&router, Method::GET, "/tiles/15/16372/10895.png", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body = json_body(&body);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_out_of_grid_tile_is_bad_request() {
    let (_, _, router) = setup();

    let (status, body) = send(&router, Method::GET, "/tiles/2/4/0.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "invalid_request");

    let (status, _) = send(&router, Method::GET, "/tiles/2/1/abc.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Job Control
// =============================================================================

#[tokio::test]
async fn test_area_job_via_api() {
    let (manager, fetcher, router) = setup();

    let request = json!({
        "min_lat": 51.50,
        "max_lat": 51.51,
        "min_lng": -0.13,
        "max_lng": -0.12,
        "zoom_levels": [13, 14, 15]
    });
    let (status, body) = send(&router, Method::POST, "/cache/area", Some(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["total"], 10);

    wait_until(|| async { manager.state().await == JobState::Completed }).await;
    assert_eq!(fetcher.request_count(), 10);

    let (status, body) = send(&router, Method::GET, "/cache/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["state"], "completed");
    assert_eq!(body["completed"], 10);
    assert_eq!(body["percent"], 100.0);
    assert_eq!(body["summary"]["cached_tiles"], 10);

    let (status, body) = send(&router, Method::GET, "/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["tiles"], 10);
    assert!(body["size_bytes"].as_u64().unwrap() > 0);

    let (status, _) = send(&router, Method::DELETE, "/cache", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&router, Method::GET, "/cache", None).await;
    assert_eq!(json_body(&body)["tiles"], 0);
    let (_, body) = send(&router, Method::GET, "/cache/progress", None).await;
    assert_eq!(json_body(&body)["state"], "idle");
}

#[tokio::test]
async fn test_boundary_job_via_api() {
    let (manager, _, router) = setup();

    let request = json!({
        "boundary": {
            "type": "MultiPolygon",
            "coordinates": [
                [[[-0.13, 51.50], [-0.12, 51.50], [-0.12, 51.51], [-0.13, 51.50]]]
            ]
        },
        "zoom_levels": [15],
        "margin": 0.0
    });
    let (status, body) = send(&router, Method::POST, "/cache/boundary", Some(request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["total"], 6);

    wait_until(|| async { manager.state().await == JobState::Completed }).await;
    assert_eq!(manager.cached_tile_count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let (manager, fetcher, router) = setup();

    let reversed = json!({
        "min_lat": 51.51, "max_lat": 51.50, "min_lng": -0.13, "max_lng": -0.12
    });
    let (status, body) = send(&router, Method::POST, "/cache/area", Some(reversed)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "invalid_request");

    let point = json!({ "boundary": { "type": "Point", "coordinates": [0.0, 0.0] } });
    let (status, _) = send(&router, Method::POST, "/cache/boundary", Some(point)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_deep = json!({
        "min_lat": 51.50, "max_lat": 51.51, "min_lng": -0.13, "max_lng": -0.12,
        "zoom_levels": [22]
    });
    let (status, _) = send(&router, Method::POST, "/cache/area", Some(too_deep)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(fetcher.request_count(), 0);
    assert_eq!(manager.state().await, JobState::Failed);
}

#[tokio::test]
async fn test_conflicts_while_running() {
    let fetcher = Arc::new(MockFetcher::new().gated());
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        fetcher.clone(),
        JobOptions::default(),
    );
    let router = router_for(manager.clone());

    let area = json!({
        "min_lat": 51.50, "max_lat": 51.51, "min_lng": -0.13, "max_lng": -0.12
    });
    let (status, _) = send(&router, Method::POST, "/cache/area", Some(area.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_until(|| async { fetcher.request_count() == 2 }).await;

    let (status, body) = send(&router, Method::POST, "/cache/area", Some(area)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["error"], "job_active");

    let (status, _) = send(&router, Method::DELETE, "/cache", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&router, Method::POST, "/cache/cancel", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["cancelled"], true);

    fetcher.release(10);
    wait_until(|| async { manager.state().await == JobState::Failed }).await;

    let (_, body) = send(&router, Method::GET, "/cache/progress", None).await;
    let body = json_body(&body);
    assert_eq!(body["completed"], 2);
    assert_eq!(body["summary"]["failure"]["reason"], "cancelled");

    let (status, body) = send(&router, Method::POST, "/cache/cancel", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["error"], "no_active_job");
}

#[tokio::test]
async fn test_health() {
    let (_, _, router) = setup();

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["status"], "healthy");
}

#[tokio::test]
async fn test_oversized_area_is_bad_request() {
    let (manager, fetcher, router) = setup();

    let world = json!({
        "min_lat": -85.0, "max_lat": 85.0, "min_lng": -180.0, "max_lng": 180.0,
        "zoom_levels": [19]
    });
    let (status, body) = send(&router, Method::POST, "/cache/area", Some(world)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["error"], "invalid_request");
    assert!(body["message"].as_str().unwrap().contains("max: 100000"));

    assert_eq!(fetcher.request_count(), 0);
    assert_eq!(manager.state().await, JobState::Failed);

    // The rejection leaves the slot free.
    let london = json!({
        "min_lat": 51.50, "max_lat": 51.51, "min_lng": -0.13, "max_lng": -0.12,
        "zoom_levels": [15]
    });
    let (status, _) = send(&router, Method::POST, "/cache/area", Some(london)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}
