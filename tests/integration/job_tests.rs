//! Cache job integration tests.
//!
//! Tests verify:
//! - Every enumerated tile is fetched and stored
//! - A second job is rejected while one is running
//! - Per-tile failures do not fail the job
//! - Cancellation and store outages end the job as `Failed`
//! - Clearing resets the slot

use std::sync::Arc;
use std::time::Duration;

use tilestash::error::{JobError, ValidationError};
use tilestash::{
    enumerate, resolve, tile_bounds, FailureReason, GeoBoundingBox, Geometry, JobOptions,
    JobState, MemoryTileStore, TileCoordinate, TileKey, TileStore,
};

use super::test_utils::{
    london_bbox, manager_with, payload_for, wait_until, FailingStore, MockFetcher,
};

/// A box spanning exactly two horizontally adjacent tiles at `zoom`.
fn two_tile_bbox(zoom: u8, x: u32, y: u32) -> GeoBoundingBox {
    let left = tile_bounds(&TileCoordinate::new(zoom, x, y).unwrap());
    let width = left.max_lng() - left.min_lng();
    let height = left.max_lat() - left.min_lat();
    GeoBoundingBox::new(
        left.min_lat() + height * 0.25,
        left.max_lat() - height * 0.25,
        left.min_lng() + width * 0.5,
        left.max_lng() + width * 0.5,
    )
    .unwrap()
}

// =============================================================================
// Successful Jobs
// =============================================================================

#[tokio::test]
async fn test_area_job_caches_every_tile() {
    let store = Arc::new(MemoryTileStore::new());
    let fetcher = Arc::new(MockFetcher::new());
    let manager = manager_with(store.clone(), fetcher.clone(), JobOptions::default());

    let summary = manager.cache_area(london_bbox(), &[13, 14, 15]).await.unwrap();

    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.total_tiles, 10);
    assert_eq!(summary.attempted_tiles, 10);
    assert_eq!(summary.cached_tiles, 10);
    assert_eq!(summary.failed_tiles, 0);
    assert!(summary.failure.is_none());

    assert_eq!(store.len().await, 10);
    assert_eq!(fetcher.request_count(), 10);

    let key = TileKey::from(TileCoordinate::new(15, 16372, 10895).unwrap());
    let url = "https://tiles.test/15/16372/10895.png";
    assert!(fetcher.requested().iter().any(|u| u == url));
    assert_eq!(store.get(&key).await.unwrap(), Some(payload_for(url)));

    let progress = manager.progress().await;
    assert_eq!(progress.completed, 10);
    assert_eq!(progress.total, 10);
    assert_eq!(progress.percent, 100.0);
}

#[tokio::test]
async fn test_duplicate_zoom_levels_counted_once() {
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        Arc::new(MockFetcher::new()),
        JobOptions::default(),
    );

    let summary = manager.cache_area(london_bbox(), &[15, 15, 15]).await.unwrap();
    assert_eq!(summary.total_tiles, 6);
    assert_eq!(manager.current_job().await.unwrap().zoom_levels, vec![15]);
}

#[tokio::test]
async fn test_repeated_job_is_idempotent() {
    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), Arc::new(MockFetcher::new()), JobOptions::default());

    manager.cache_area(london_bbox(), &[13, 14, 15]).await.unwrap();
    let keys = manager.cached_keys().await.unwrap();
    let size = manager.cache_size_bytes().await.unwrap();

    let summary = manager.cache_area(london_bbox(), &[13, 14, 15]).await.unwrap();
    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(manager.cached_keys().await.unwrap(), keys);
    assert_eq!(manager.cache_size_bytes().await.unwrap(), size);
}

#[tokio::test]
async fn test_boundary_job_covers_padded_box() {
    let geojson = r#"{
        "type": "Feature",
        "properties": {"name": "Westminster"},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[-0.13, 51.50], [-0.12, 51.50], [-0.12, 51.51], [-0.13, 51.51], [-0.13, 51.50]]]
        }
    }"#;
    let geometry = Geometry::from_geojson(geojson).unwrap();
    let padded = resolve(&geometry, 0.005).unwrap();
    let expected = enumerate(&padded, &[14, 15]).len();

    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), Arc::new(MockFetcher::new()), JobOptions::default());

    let summary = manager.cache_boundary(&geometry, &[14, 15]).await.unwrap();
    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.total_tiles, expected);
    assert!(expected > 6);
    assert_eq!(store.len().await, expected);

    let job = manager.current_job().await.unwrap();
    assert_eq!(job.bounding_box, Some(padded));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_fetch_does_not_fail_job() {
    let bbox = two_tile_bbox(15, 16372, 10896);
    let fetcher = Arc::new(
        MockFetcher::new().failing(["https://tiles.test/15/16373/10896.png"]),
    );
    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), fetcher, JobOptions::default());

    let summary = manager.cache_area(bbox, &[15]).await.unwrap();

    assert_eq!(summary.total_tiles, 2);
    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.attempted_tiles, summary.total_tiles);
    assert_eq!(summary.cached_tiles, 1);
    assert_eq!(summary.failed_tiles, 1);
    assert_eq!(store.len().await, 1);

    assert!(manager.is_tile_cached(15, 16372, 10896).await.unwrap());
    assert!(!manager.is_tile_cached(15, 16373, 10896).await.unwrap());
}

#[tokio::test]
async fn test_store_outage_fails_job() {
    let store = Arc::new(FailingStore::after(3));
    let fetcher = Arc::new(MockFetcher::new());
    let manager = manager_with(store.clone(), fetcher.clone(), JobOptions::default());

    let summary = manager.cache_area(london_bbox(), &[13, 14, 15]).await.unwrap();

    assert_eq!(summary.state, JobState::Failed);
    assert!(matches!(
        summary.failure,
        Some(FailureReason::StoreUnavailable(_))
    ));
    // Two full batches of two, the second losing one write.
    assert_eq!(summary.attempted_tiles, 4);
    assert_eq!(summary.cached_tiles, 3);
    assert_eq!(summary.failed_tiles, 1);
    assert_eq!(fetcher.request_count(), 4);
    assert_eq!(store.keys().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_zoom_above_max_rejected() {
    let fetcher = Arc::new(MockFetcher::new());
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        fetcher.clone(),
        JobOptions::default(),
    );

    let err = manager.cache_area(london_bbox(), &[15, 25]).await.unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));
    assert_eq!(fetcher.request_count(), 0);

    let summary = manager.summary().await.unwrap();
    assert_eq!(summary.state, JobState::Failed);
    assert!(matches!(summary.failure, Some(FailureReason::Validation(_))));
}

#[tokio::test]
async fn test_empty_zoom_levels_rejected() {
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        Arc::new(MockFetcher::new()),
        JobOptions::default(),
    );

    let err = manager.cache_area(london_bbox(), &[]).await.unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));
    assert_eq!(manager.state().await, JobState::Failed);
}

// =============================================================================
// Single Active Job
// =============================================================================

#[tokio::test]
async fn test_second_job_rejected_while_running() {
    let fetcher = Arc::new(MockFetcher::new().gated());
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        fetcher.clone(),
        JobOptions::default(),
    );

    let handle = manager
        .spawn_area(london_bbox(), &[13, 14, 15])
        .await
        .unwrap();
    wait_until(|| async { fetcher.request_count() == 2 }).await;

    let before = manager.current_job().await.unwrap();
    assert_eq!(before.state, JobState::Running);

    let err = manager
        .spawn_area(GeoBoundingBox::new(40.0, 40.1, -74.1, -74.0).unwrap(), &[10])
        .await
        .unwrap_err();
    assert_eq!(err, JobError::AlreadyActive);

    let after = manager.current_job().await.unwrap();
    assert_eq!(after.bounding_box, before.bounding_box);
    assert_eq!(after.total_tiles, 10);
    assert_eq!(after.state, JobState::Running);

    assert_eq!(manager.clear_cache().await, Err(JobError::AlreadyActive));

    fetcher.release(10);
    let summary = handle.await.unwrap();
    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.cached_tiles, 10);
}

#[tokio::test]
async fn test_cancel_keeps_written_tiles() {
    let fetcher = Arc::new(MockFetcher::new().gated());
    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), fetcher.clone(), JobOptions::default());

    let handle = manager
        .spawn_area(london_bbox(), &[13, 14, 15])
        .await
        .unwrap();
    wait_until(|| async { fetcher.request_count() == 2 }).await;

    assert!(manager.cancel().await);
    assert!(!manager.cancel().await);
    fetcher.release(10);

    let summary = handle.await.unwrap();
    assert_eq!(summary.state, JobState::Failed);
    assert_eq!(summary.failure, Some(FailureReason::Cancelled));
    assert_eq!(summary.attempted_tiles, 2);
    assert_eq!(summary.cached_tiles, 2);
    assert_eq!(fetcher.request_count(), 2);
    assert_eq!(store.len().await, 2);

    // The slot is free again.
    assert!(!manager.cancel().await);
    let next = manager.cache_area(london_bbox(), &[13]).await.unwrap();
    assert_eq!(next.state, JobState::Completed);
}

#[tokio::test]
async fn test_clear_resets_to_idle() {
    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), Arc::new(MockFetcher::new()), JobOptions::default());

    manager.cache_area(london_bbox(), &[14, 15]).await.unwrap();
    assert_eq!(manager.cached_tile_count().await.unwrap(), 8);

    manager.clear_cache().await.unwrap();

    assert_eq!(manager.state().await, JobState::Idle);
    assert!(manager.summary().await.is_none());
    assert_eq!(manager.progress().await.total, 0);
    assert_eq!(manager.cached_tile_count().await.unwrap(), 0);
    assert_eq!(manager.cache_size_bytes().await.unwrap(), 0);
}

#[tokio::test]
async fn test_timed_out_job_does_not_wedge_slot() {
    let fetcher = Arc::new(MockFetcher::new().gated());
    let store = Arc::new(MemoryTileStore::new());
    let manager = manager_with(store.clone(), fetcher.clone(), JobOptions::default());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(100),
        manager.cache_area(london_bbox(), &[15]),
    )
    .await;
    assert!(timed_out.is_err());
    fetcher.release(100);

    assert_eq!(manager.state().await, JobState::Failed);
    assert_eq!(
        manager.summary().await.unwrap().failure,
        Some(FailureReason::Cancelled)
    );

    let next = manager.cache_area(london_bbox(), &[15]).await.unwrap();
    assert_eq!(next.state, JobState::Completed);
    assert_eq!(next.cached_tiles, 6);

    manager.clear_cache().await.unwrap();
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn test_world_at_street_zoom_rejected() {
    let fetcher = Arc::new(MockFetcher::new());
    let manager = manager_with(
        Arc::new(MemoryTileStore::new()),
        fetcher.clone(),
        JobOptions::default(),
    );
    let world = GeoBoundingBox::new(-85.0, 85.0, -180.0, 180.0).unwrap();

    let err = manager.cache_area(world, &[19]).await.unwrap_err();
    assert!(matches!(
        err,
        JobError::Validation(ValidationError::TooManyTiles { max: 100_000, .. })
    ));
    assert_eq!(fetcher.request_count(), 0);
}
