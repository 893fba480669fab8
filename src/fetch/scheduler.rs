//! Batched, paced tile fetching.
//!
//! Tasks are processed in consecutive batches of at most `concurrency`
//! tasks. Every fetch in a batch runs concurrently and the batch resolves
//! only when all of them have finished; the next batch starts after the
//! inter-batch delay.
//!
//! ```text
//!  tasks ─► [t0 t1] ─ delay ─► [t2 t3] ─ delay ─► [t4]
//!             │  │               │  │               │
//!             ▼  ▼               ▼  ▼               ▼
//!           fetch+put          fetch+put          fetch+put
//!             └─► on_batch(2)    └─► on_batch(4)    └─► on_batch(5)
//! ```
//!
//! A failed fetch or a failed write is counted and skipped. Only an
//! unreachable store or a cancellation request stops the run, and both are
//! observed at batch boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{StoreError, ValidationError};
use crate::geo::TileCoordinate;
use crate::store::{TileKey, TileStore};

use super::http::TileFetcher;
use super::template::UrlTemplate;

/// Default number of concurrent fetches per batch.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default pause between batches.
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Tasks and Configuration
// =============================================================================

/// One tile to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub tile: TileCoordinate,
    pub key: TileKey,
    pub url: String,
}

impl FetchTask {
    /// Build the task for `tile` against `template`.
    pub fn new(tile: TileCoordinate, template: &UrlTemplate) -> Self {
        Self {
            tile,
            key: TileKey::from(tile),
            url: template.render(&tile),
        }
    }
}

/// Batch size and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum fetches in flight at once
    pub concurrency: usize,
    /// Pause between consecutive batches
    pub inter_batch_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        Ok(())
    }
}

// =============================================================================
// Pacing and Cancellation
// =============================================================================

/// Waits between batches.
///
/// Injected so the scheduler can run without real timers in tests.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// [`Pacer`] that sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag. Cancellation is sticky.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `false` if it was already requested.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Why a run ended before attempting every task.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Cancelled,
    StoreUnavailable(StoreError),
}

/// Running totals of a scheduler run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    /// Tasks whose fetch was issued and resolved
    pub attempted: usize,
    /// Tasks whose payload landed in the store
    pub cached: usize,
    /// Tasks that failed to fetch or to store
    pub failed: usize,
    /// Set when the run stopped early
    pub stopped: Option<StopReason>,
}

enum TileOutcome {
    Cached,
    Failed,
    StoreUnavailable(StoreError),
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs fetch tasks in paced batches and writes results to a store.
pub struct FetchScheduler {
    fetcher: Arc<dyn TileFetcher>,
    store: Arc<dyn TileStore>,
    pacer: Arc<dyn Pacer>,
    config: SchedulerConfig,
}

impl FetchScheduler {
    /// Create a scheduler.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of tile payloads
    /// * `store` - Destination for fetched payloads
    /// * `pacer` - Waits out the inter-batch delay
    /// * `config` - Batch size and delay
    pub fn new(
        fetcher: Arc<dyn TileFetcher>,
        store: Arc<dyn TileStore>,
        pacer: Arc<dyn Pacer>,
        config: SchedulerConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            store,
            pacer,
            config,
        })
    }

    /// Replace the pacer.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Process `tasks` in order.
    ///
    /// `on_batch` is called after every batch with the running totals.
    /// Cancellation is checked before each batch, after the inter-batch
    /// pause, so a request made during the pause is honoured.
    pub async fn run<F>(
        &self,
        tasks: &[FetchTask],
        cancel: &CancelToken,
        mut on_batch: F,
    ) -> ScheduleReport
    where
        F: FnMut(&ScheduleReport) + Send,
    {
        let mut report = ScheduleReport::default();

        for (index, batch) in tasks.chunks(self.config.concurrency).enumerate() {
            if index > 0 {
                self.pacer.pause(self.config.inter_batch_delay).await;
            }
            if cancel.is_cancelled() {
                debug!(attempted = report.attempted, "Fetch run cancelled");
                report.stopped = Some(StopReason::Cancelled);
                return report;
            }

            let outcomes = join_all(batch.iter().map(|task| self.fetch_one(task))).await;

            let mut unavailable = None;
            for outcome in outcomes {
                report.attempted += 1;
                match outcome {
                    TileOutcome::Cached => report.cached += 1,
                    TileOutcome::Failed => report.failed += 1,
                    TileOutcome::StoreUnavailable(err) => {
                        report.failed += 1;
                        unavailable.get_or_insert(err);
                    }
                }
            }

            on_batch(&report);

            if let Some(err) = unavailable {
                report.stopped = Some(StopReason::StoreUnavailable(err));
                return report;
            }
        }

        report
    }

    async fn fetch_one(&self, task: &FetchTask) -> TileOutcome {
        let blob = match self.fetcher.fetch(&task.url).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(tile = %task.tile, error = %e, "Tile fetch failed");
                return TileOutcome::Failed;
            }
        };

        let size = blob.len();
        match self.store.put(&task.key, blob).await {
            Ok(()) => {
                debug!(tile = %task.tile, size, "Cached tile");
                TileOutcome::Cached
            }
            Err(e) if e.is_unavailable() => TileOutcome::StoreUnavailable(e),
            Err(e) => {
                warn!(tile = %task.tile, error = %e, "Tile write failed");
                TileOutcome::Failed
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
