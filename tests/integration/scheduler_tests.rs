//! Fetch scheduler integration tests.
//!
//! Tests verify:
//! - No more than `concurrency` fetches are in flight at once
//! - Batches are separated by exactly one pause each
//! - Tasks are fetched in enumeration order

use std::sync::Arc;
use std::time::Duration;

use tilestash::{
    enumerate, CancelToken, FetchScheduler, FetchTask, MemoryTileStore, SchedulerConfig,
};

use super::test_utils::{london_bbox, test_template, CountingPacer, MockFetcher};

fn london_tasks() -> Vec<FetchTask> {
    let template = test_template();
    enumerate(&london_bbox(), &[13, 14, 15])
        .into_iter()
        .map(|tile| FetchTask::new(tile, &template))
        .collect()
}

#[tokio::test]
async fn test_concurrency_bound_respected() {
    for concurrency in [1, 3, 4] {
        let fetcher = Arc::new(MockFetcher::new().with_delay(Duration::from_millis(5)));
        let store = Arc::new(MemoryTileStore::new());
        let pacer = Arc::new(CountingPacer::default());
        let scheduler = FetchScheduler::new(
            fetcher.clone(),
            store.clone(),
            pacer.clone(),
            SchedulerConfig {
                concurrency,
                inter_batch_delay: Duration::from_millis(100),
            },
        )
        .unwrap();

        let report = scheduler
            .run(&london_tasks(), &CancelToken::new(), |_| {})
            .await;

        assert_eq!(report.attempted, 10);
        assert_eq!(report.cached, 10);
        assert!(report.stopped.is_none());
        assert!(
            fetcher.max_in_flight() <= concurrency,
            "concurrency {} exceeded: {}",
            concurrency,
            fetcher.max_in_flight()
        );
        assert_eq!(fetcher.max_in_flight(), concurrency);

        let batches = 10usize.div_ceil(concurrency);
        assert_eq!(pacer.pauses(), batches - 1);
        assert_eq!(store.len().await, 10);
    }
}

#[tokio::test]
async fn test_tasks_fetched_in_order() {
    let fetcher = Arc::new(MockFetcher::new());
    let scheduler = FetchScheduler::new(
        fetcher.clone(),
        Arc::new(MemoryTileStore::new()),
        Arc::new(CountingPacer::default()),
        SchedulerConfig {
            concurrency: 1,
            inter_batch_delay: Duration::ZERO,
        },
    )
    .unwrap();

    let tasks = london_tasks();
    scheduler.run(&tasks, &CancelToken::new(), |_| {}).await;

    let expected: Vec<String> = tasks.iter().map(|task| task.url.clone()).collect();
    assert_eq!(fetcher.requested(), expected);
    assert_eq!(expected[0], "https://tiles.test/13/4093/2723.png");
}

#[tokio::test]
async fn test_progress_reported_per_batch() {
    let scheduler = FetchScheduler::new(
        Arc::new(MockFetcher::new()),
        Arc::new(MemoryTileStore::new()),
        Arc::new(CountingPacer::default()),
        SchedulerConfig {
            concurrency: 4,
            inter_batch_delay: Duration::ZERO,
        },
    )
    .unwrap();

    let mut seen = Vec::new();
    scheduler
        .run(&london_tasks(), &CancelToken::new(), |report| {
            seen.push(report.attempted)
        })
        .await;

    assert_eq!(seen, vec![4, 8, 10]);
}
