//! Cache job controller.
//!
//! [`CacheManager`] owns the store, the fetch pipeline and a single job slot.
//! At most one job runs at a time:
//!
//! ```text
//!   cache_area / cache_boundary
//!              │
//!              ▼
//!   ┌─────────────────────┐  Running   ┌──────────────────┐
//!   │ admit (slot lock)   │──────────► │ AlreadyActive    │
//!   └──────────┬──────────┘            └──────────────────┘
//!              │ validate + enumerate
//!              ▼
//!   ┌─────────────────────┐  batch done  ┌────────────────┐
//!   │ FetchScheduler::run │────────────► │ watch progress │
//!   └──────────┬──────────┘              └────────────────┘
//!              ▼
//!      Completed | Failed  (kept in the slot until the next job or clear)
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{JobError, StoreError, ValidationError};
use crate::fetch::{
    CancelToken, FetchScheduler, FetchTask, Pacer, ScheduleReport, SchedulerConfig, StopReason,
    TileFetcher, TokioPacer, UrlTemplate, DEFAULT_CONCURRENCY, DEFAULT_INTER_BATCH_DELAY,
};
use crate::geo::{
    self, GeoBoundingBox, Geometry, TileCoordinate, DEFAULT_MARGIN_DEGREES, MAX_TILE_ZOOM,
};
use crate::store::{TileKey, TileStore};

use super::progress::{CacheJob, FailureReason, JobProgress, JobState, JobSummary};

/// Zoom levels cached when a request does not name any.
pub const DEFAULT_ZOOM_LEVELS: [u8; 3] = [13, 14, 15];

/// Highest zoom accepted by default (OpenStreetMap's standard layer).
pub const DEFAULT_MAX_ZOOM: u8 = 19;

/// Most tiles a single job may cover by default.
pub const DEFAULT_MAX_TILES: u64 = 100_000;

// =============================================================================
// Options
// =============================================================================

/// Job configuration shared by every job a manager runs.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    /// Zoom levels used when the caller passes none
    pub zoom_levels: Vec<u8>,
    /// Concurrent fetches per batch
    pub concurrency: usize,
    /// Pause between batches
    pub inter_batch_delay: Duration,
    /// Padding around boundaries, in degrees
    pub margin_degrees: f64,
    /// Highest zoom the tile source serves
    pub max_zoom: u8,
    /// Requests covering more tiles than this are rejected
    pub max_tiles: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            zoom_levels: DEFAULT_ZOOM_LEVELS.to_vec(),
            concurrency: DEFAULT_CONCURRENCY,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            margin_degrees: DEFAULT_MARGIN_DEGREES,
            max_zoom: DEFAULT_MAX_ZOOM,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_zoom > MAX_TILE_ZOOM {
            return Err(ValidationError::ZoomOutOfRange {
                zoom: self.max_zoom,
                max: MAX_TILE_ZOOM,
            });
        }
        if !self.margin_degrees.is_finite() || self.margin_degrees < 0.0 {
            return Err(ValidationError::InvalidMargin(self.margin_degrees));
        }
        if self.max_tiles == 0 {
            return Err(ValidationError::InvalidTileLimit);
        }
        self.scheduler_config().validate()?;
        normalize_zoom_levels(&self.zoom_levels, self.max_zoom)?;
        Ok(())
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency,
            inter_batch_delay: self.inter_batch_delay,
        }
    }
}

/// Drop repeated zooms (keeping first occurrences) and check each against
/// `max_zoom`.
fn normalize_zoom_levels(zoom_levels: &[u8], max_zoom: u8) -> Result<Vec<u8>, ValidationError> {
    if zoom_levels.is_empty() {
        return Err(ValidationError::EmptyZoomLevels);
    }
    let mut unique = Vec::with_capacity(zoom_levels.len());
    for &zoom in zoom_levels {
        if zoom > max_zoom {
            return Err(ValidationError::ZoomOutOfRange {
                zoom,
                max: max_zoom,
            });
        }
        if !unique.contains(&zoom) {
            unique.push(zoom);
        }
    }
    Ok(unique)
}

// =============================================================================
// Job Slot
// =============================================================================

/// Handles of the job that is currently running.
struct LiveJob {
    progress: watch::Receiver<ScheduleReport>,
    cancel: CancelToken,
}

impl LiveJob {
    /// The task driving the job went away without recording an outcome:
    /// its future was dropped or it panicked, closing the progress channel.
    fn is_abandoned(&self) -> bool {
        self.progress.has_changed().is_err()
    }
}

#[derive(Default)]
struct JobSlot {
    job: Option<CacheJob>,
    live: Option<LiveJob>,
}

impl JobSlot {
    fn is_running(&self) -> bool {
        let driven = self.live.as_ref().is_some_and(|live| !live.is_abandoned());
        driven && matches!(&self.job, Some(job) if job.state == JobState::Running)
    }

    /// The slot's job with live counters applied.
    fn snapshot(&self) -> Option<CacheJob> {
        let mut job = self.job.clone()?;
        if let Some(live) = &self.live {
            apply_report(&mut job, &live.progress.borrow());
            if live.is_abandoned() && job.state == JobState::Running {
                finish_abandoned(&mut job);
            }
        }
        Some(job)
    }

    /// Record the outcome of an abandoned job so the slot can be reused.
    fn settle(&mut self) {
        if !self.live.as_ref().is_some_and(LiveJob::is_abandoned) {
            return;
        }
        self.job = self.snapshot();
        self.live = None;
        if let Some(job) = &self.job {
            warn!(
                state = %job.state,
                attempted = job.completed_tiles,
                total_tiles = job.total_tiles,
                "Cache job abandoned before recording its outcome"
            );
        }
    }
}

/// Terminal state of a job whose driver stopped early.
fn finish_abandoned(job: &mut CacheJob) {
    if job.completed_tiles >= job.total_tiles {
        job.state = JobState::Completed;
    } else {
        job.state = JobState::Failed;
        job.failure = Some(FailureReason::Cancelled);
    }
}

fn apply_report(job: &mut CacheJob, report: &ScheduleReport) {
    job.completed_tiles = report.attempted;
    job.cached_tiles = report.cached;
    job.failed_tiles = report.failed;
}

/// What the request names as its area.
enum AreaSource<'a> {
    Area(GeoBoundingBox),
    Boundary { geometry: &'a Geometry, margin: f64 },
}

/// A job that passed admission and has tiles to fetch.
struct AdmittedJob {
    job: CacheJob,
    tasks: Vec<FetchTask>,
    progress: watch::Sender<ScheduleReport>,
    cancel: CancelToken,
}

enum Admission {
    Run(AdmittedJob),
    /// Nothing to fetch; the job completed on admission
    Done(JobSummary),
}

// =============================================================================
// Cache Manager
// =============================================================================

/// Orchestrates caching jobs against one store and one tile source.
///
/// Construct once per process and share via `Arc`.
///
/// # Example
///
/// ```ignore
/// let manager = CacheManager::new(store, fetcher, TileLayer::Street.template(), JobOptions::default())?;
/// let bbox = GeoBoundingBox::new(51.50, 51.51, -0.13, -0.12)?;
/// let summary = manager.cache_area(bbox, &[13, 14, 15]).await?;
/// println!("cached {} of {} tiles", summary.cached_tiles, summary.total_tiles);
/// ```
pub struct CacheManager {
    store: Arc<dyn TileStore>,
    scheduler: FetchScheduler,
    template: UrlTemplate,
    options: JobOptions,
    slot: RwLock<JobSlot>,
}

impl CacheManager {
    /// Create a manager that paces batches on the tokio timer.
    ///
    /// # Arguments
    ///
    /// * `store` - Where fetched tiles are kept
    /// * `fetcher` - Retrieves tile payloads
    /// * `template` - Tile source URL template
    /// * `options` - Job defaults, concurrency and pacing
    pub fn new(
        store: Arc<dyn TileStore>,
        fetcher: Arc<dyn TileFetcher>,
        template: UrlTemplate,
        options: JobOptions,
    ) -> Result<Self, ValidationError> {
        options.validate()?;
        let scheduler = FetchScheduler::new(
            fetcher,
            store.clone(),
            Arc::new(TokioPacer),
            options.scheduler_config(),
        )?;
        Ok(Self {
            store,
            scheduler,
            template,
            options,
            slot: RwLock::new(JobSlot::default()),
        })
    }

    /// Replace the inter-batch pacer.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.scheduler = self.scheduler.with_pacer(pacer);
        self
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }

    pub fn store(&self) -> &Arc<dyn TileStore> {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Jobs
    // -------------------------------------------------------------------------

    /// Cache every tile covering `bbox` at `zoom_levels` and wait for the job
    /// to end.
    ///
    /// Returns [`JobError::AlreadyActive`] without touching the running job
    /// if one is in progress, and [`JobError::Validation`] when the request
    /// is rejected before any fetch.
    pub async fn cache_area(
        &self,
        bbox: GeoBoundingBox,
        zoom_levels: &[u8],
    ) -> Result<JobSummary, JobError> {
        match self.admit(AreaSource::Area(bbox), zoom_levels).await? {
            Admission::Run(admitted) => Ok(self.execute(admitted).await),
            Admission::Done(summary) => Ok(summary),
        }
    }

    /// Cache the padded bounding box of `geometry` using the configured
    /// margin.
    pub async fn cache_boundary(
        &self,
        geometry: &Geometry,
        zoom_levels: &[u8],
    ) -> Result<JobSummary, JobError> {
        self.cache_boundary_with_margin(geometry, zoom_levels, self.options.margin_degrees)
            .await
    }

    /// Cache the bounding box of `geometry` grown by `margin_degrees`.
    pub async fn cache_boundary_with_margin(
        &self,
        geometry: &Geometry,
        zoom_levels: &[u8],
        margin_degrees: f64,
    ) -> Result<JobSummary, JobError> {
        let source = AreaSource::Boundary {
            geometry,
            margin: margin_degrees,
        };
        match self.admit(source, zoom_levels).await? {
            Admission::Run(admitted) => Ok(self.execute(admitted).await),
            Admission::Done(summary) => Ok(summary),
        }
    }

    /// Admit an area job and run it on a background task.
    ///
    /// Admission and validation errors are returned before anything is
    /// spawned.
    pub async fn spawn_area(
        self: &Arc<Self>,
        bbox: GeoBoundingBox,
        zoom_levels: &[u8],
    ) -> Result<JoinHandle<JobSummary>, JobError> {
        let admission = self.admit(AreaSource::Area(bbox), zoom_levels).await?;
        Ok(self.spawn_admitted(admission))
    }

    /// Admit a boundary job and run it on a background task.
    ///
    /// `margin_degrees` defaults to the configured margin.
    pub async fn spawn_boundary(
        self: &Arc<Self>,
        geometry: &Geometry,
        zoom_levels: &[u8],
        margin_degrees: Option<f64>,
    ) -> Result<JoinHandle<JobSummary>, JobError> {
        let source = AreaSource::Boundary {
            geometry,
            margin: margin_degrees.unwrap_or(self.options.margin_degrees),
        };
        let admission = self.admit(source, zoom_levels).await?;
        Ok(self.spawn_admitted(admission))
    }

    fn spawn_admitted(self: &Arc<Self>, admission: Admission) -> JoinHandle<JobSummary> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match admission {
                Admission::Run(admitted) => manager.execute(admitted).await,
                Admission::Done(summary) => summary,
            }
        })
    }

    /// Request cancellation of the running job.
    ///
    /// Takes effect before the next batch. Returns `false` when no job is
    /// running or cancellation was already requested.
    pub async fn cancel(&self) -> bool {
        let slot = self.slot.read().await;
        match slot.live.as_ref().filter(|live| !live.is_abandoned()) {
            Some(live) => {
                let requested = live.cancel.cancel();
                if requested {
                    info!("Cancellation requested for running cache job");
                }
                requested
            }
            None => false,
        }
    }

    /// Claim the slot, validate the request and enumerate its tiles.
    async fn admit(
        &self,
        source: AreaSource<'_>,
        zoom_levels: &[u8],
    ) -> Result<Admission, JobError> {
        let mut slot = self.slot.write().await;
        slot.settle();
        if slot.is_running() {
            debug!("Rejected cache job: another job is running");
            return Err(JobError::AlreadyActive);
        }

        let (bbox, zooms) = match self.validate_request(&source, zoom_levels) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Rejected cache job");
                let bbox = match source {
                    AreaSource::Area(bbox) => Some(bbox),
                    AreaSource::Boundary { .. } => None,
                };
                slot.job = Some(CacheJob::rejected(bbox, zoom_levels.to_vec(), e.to_string()));
                slot.live = None;
                return Err(e.into());
            }
        };

        let tasks: Vec<FetchTask> = geo::enumerate(&bbox, &zooms)
            .into_iter()
            .map(|tile| FetchTask::new(tile, &self.template))
            .collect();
        let mut job = CacheJob::running(bbox, zooms, tasks.len());

        info!(
            total_tiles = job.total_tiles,
            zoom_levels = ?job.zoom_levels,
            min_lat = bbox.min_lat(),
            max_lat = bbox.max_lat(),
            min_lng = bbox.min_lng(),
            max_lng = bbox.max_lng(),
            "Starting cache job"
        );

        if tasks.is_empty() {
            job.state = JobState::Completed;
            let summary = job.summary();
            slot.job = Some(job);
            slot.live = None;
            return Ok(Admission::Done(summary));
        }

        let (progress, receiver) = watch::channel(ScheduleReport::default());
        let cancel = CancelToken::new();
        slot.job = Some(job.clone());
        slot.live = Some(LiveJob {
            progress: receiver,
            cancel: cancel.clone(),
        });

        Ok(Admission::Run(AdmittedJob {
            job,
            tasks,
            progress,
            cancel,
        }))
    }

    fn validate_request(
        &self,
        source: &AreaSource<'_>,
        zoom_levels: &[u8],
    ) -> Result<(GeoBoundingBox, Vec<u8>), ValidationError> {
        let zooms = normalize_zoom_levels(zoom_levels, self.options.max_zoom)?;
        let bbox = match source {
            AreaSource::Area(bbox) => *bbox,
            AreaSource::Boundary { geometry, margin } => geo::resolve(geometry, *margin)?,
        };

        // Counted before anything is materialized
        let count = geo::count_tiles(&bbox, &zooms);
        if count > self.options.max_tiles {
            return Err(ValidationError::TooManyTiles {
                count,
                max: self.options.max_tiles,
            });
        }
        Ok((bbox, zooms))
    }

    /// Run an admitted job to its end and record the outcome in the slot.
    async fn execute(&self, admitted: AdmittedJob) -> JobSummary {
        let AdmittedJob {
            mut job,
            tasks,
            progress,
            cancel,
        } = admitted;
        let total = job.total_tiles;

        let report = self
            .scheduler
            .run(&tasks, &cancel, |report| {
                let current = JobProgress::new(report.attempted, total);
                debug!(
                    completed = current.completed,
                    total = current.total,
                    percent = current.percent,
                    "Cache job progress"
                );
                progress.send_replace(report.clone());
            })
            .await;

        apply_report(&mut job, &report);
        match &report.stopped {
            None => {
                job.state = JobState::Completed;
                info!(
                    total_tiles = total,
                    cached = report.cached,
                    failed = report.failed,
                    "Cache job completed"
                );
            }
            Some(StopReason::Cancelled) => {
                job.state = JobState::Failed;
                job.failure = Some(FailureReason::Cancelled);
                warn!(
                    attempted = report.attempted,
                    total_tiles = total,
                    "Cache job cancelled"
                );
            }
            Some(StopReason::StoreUnavailable(e)) => {
                job.state = JobState::Failed;
                job.failure = Some(FailureReason::StoreUnavailable(e.to_string()));
                error!(
                    error = %e,
                    attempted = report.attempted,
                    total_tiles = total,
                    "Cache job failed: store unavailable"
                );
            }
        }

        let summary = job.summary();
        let mut slot = self.slot.write().await;
        slot.job = Some(job);
        slot.live = None;
        summary
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// State of the slot: `Idle` before the first job and after a clear.
    pub async fn state(&self) -> JobState {
        let slot = self.slot.read().await;
        slot.snapshot().map_or(JobState::Idle, |job| job.state)
    }

    /// Progress of the running or last job.
    pub async fn progress(&self) -> JobProgress {
        let slot = self.slot.read().await;
        slot.snapshot()
            .map(|job| job.progress())
            .unwrap_or_default()
    }

    /// Summary of the running or last job.
    pub async fn summary(&self) -> Option<JobSummary> {
        self.slot.read().await.snapshot().map(|job| job.summary())
    }

    /// The running or last job.
    pub async fn current_job(&self) -> Option<CacheJob> {
        self.slot.read().await.snapshot()
    }

    // -------------------------------------------------------------------------
    // Store Access
    // -------------------------------------------------------------------------

    /// Whether the tile `zoom/x/y` is in the store.
    pub async fn is_tile_cached(&self, zoom: u8, x: u32, y: u32) -> Result<bool, JobError> {
        let key = TileKey::from(TileCoordinate::new(zoom, x, y)?);
        Ok(self.store.has(&key).await?)
    }

    /// Stored payload for `key`.
    pub async fn get_cached_tile(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        self.store.get(key).await
    }

    /// Remove every cached tile and reset the slot to `Idle`.
    ///
    /// Rejected with [`JobError::AlreadyActive`] while a job is running.
    pub async fn clear_cache(&self) -> Result<(), JobError> {
        let mut slot = self.slot.write().await;
        slot.settle();
        if slot.is_running() {
            return Err(JobError::AlreadyActive);
        }
        self.store.clear().await?;
        slot.job = None;
        slot.live = None;
        info!("Cleared tile cache");
        Ok(())
    }

    /// Total bytes held by the store.
    pub async fn cache_size_bytes(&self) -> Result<u64, StoreError> {
        self.store.total_size_bytes().await
    }

    pub async fn cached_keys(&self) -> Result<BTreeSet<TileKey>, StoreError> {
        self.store.keys().await
    }

    pub async fn cached_tile_count(&self) -> Result<usize, StoreError> {
        Ok(self.store.keys().await?.len())
    }
}

// =============================================================================
// Tests
// =============================================================================
