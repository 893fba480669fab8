//! On-disk store integration tests.
//!
//! Tests verify:
//! - A job persists every tile as a file that survives reopening the store
//! - Tiles written by one process are served by the next
//! - Losing the directory mid-job fails the job as store-unavailable

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use tilestash::{
    create_router, DiskTileStore, FailureReason, JobOptions, JobState, RouterConfig, TileStore,
};

use super::test_utils::{london_bbox, manager_with, wait_until, MockFetcher};

#[tokio::test]
async fn test_job_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tiles");

    {
        let store = Arc::new(DiskTileStore::new(root.clone()).unwrap());
        let manager = manager_with(store, Arc::new(MockFetcher::new()), JobOptions::default());
        let summary = manager.cache_area(london_bbox(), &[13, 14, 15]).await.unwrap();
        assert_eq!(summary.cached_tiles, 10);
    }

    let files = std::fs::read_dir(&root).unwrap().count();
    assert_eq!(files, 10);

    let reopened = Arc::new(DiskTileStore::new(root).unwrap());
    assert_eq!(reopened.keys().await.unwrap().len(), 10);

    let manager = manager_with(
        reopened,
        Arc::new(MockFetcher::new()),
        JobOptions::default(),
    );
    assert!(manager.is_tile_cached(13, 4093, 2723).await.unwrap());

    let router = create_router(manager.clone(), RouterConfig::default().with_tracing(false));
    let request = Request::builder()
        .uri("/tiles/13/4093/2724.png")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");

    let size = manager.cache_size_bytes().await.unwrap();
    assert!(size > 0);

    manager.clear_cache().await.unwrap();
    assert_eq!(manager.cached_tile_count().await.unwrap(), 0);
    assert_eq!(manager.cache_size_bytes().await.unwrap(), 0);
}

#[tokio::test]
async fn test_removed_directory_fails_job() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tiles");
    let store = Arc::new(DiskTileStore::new(root.clone()).unwrap());

    let fetcher = Arc::new(MockFetcher::new().gated());
    let manager = manager_with(store, fetcher.clone(), JobOptions::default());

    let handle = manager
        .spawn_area(london_bbox(), &[13, 14, 15])
        .await
        .unwrap();
    wait_until(|| async { fetcher.request_count() == 2 }).await;

    std::fs::remove_dir_all(&root).unwrap();
    fetcher.release(10);

    let summary = handle.await.unwrap();
    assert_eq!(summary.state, JobState::Failed);
    assert!(matches!(
        summary.failure,
        Some(FailureReason::StoreUnavailable(_))
    ));
    assert_eq!(summary.attempted_tiles, 2);
    assert_eq!(summary.cached_tiles, 0);
    assert_eq!(fetcher.request_count(), 2);
    assert_eq!(manager.state().await, JobState::Failed);
}
