//! Job state, progress and summaries.

use std::fmt;

use serde::Serialize;

use crate::geo::GeoBoundingBox;

/// Lifecycle of the controller's job slot.
///
/// ```text
/// Idle ──► Running ──► Completed
///             │
///             └──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a job ended in [`JobState::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The request was rejected before any tile was fetched
    Validation(String),
    /// Cancellation was requested while the job ran
    Cancelled,
    /// The store became unreachable; no further batches were started
    StoreUnavailable(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Validation(msg) => write!(f, "validation failed: {}", msg),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

/// Progress of the current or last job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JobProgress {
    pub completed: usize,
    pub total: usize,
    /// `completed / total * 100`, or 0 when there is nothing to fetch
    pub percent: f64,
}

impl JobProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Outcome of a job, available once it has ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub state: JobState,
    pub total_tiles: usize,
    /// Tiles whose fetch was attempted
    pub attempted_tiles: usize,
    /// Tiles written to the store
    pub cached_tiles: usize,
    /// Tiles that failed to fetch or store
    pub failed_tiles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

/// One caching request as tracked by the controller.
///
/// Lives in the controller's slot from admission until the next job or an
/// explicit clear; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheJob {
    /// Area being cached; absent when the boundary could not be resolved
    pub bounding_box: Option<GeoBoundingBox>,
    /// Requested zoom levels, duplicates removed
    pub zoom_levels: Vec<u8>,
    pub total_tiles: usize,
    pub completed_tiles: usize,
    pub cached_tiles: usize,
    pub failed_tiles: usize,
    pub state: JobState,
    pub failure: Option<FailureReason>,
}

impl CacheJob {
    pub(crate) fn running(
        bounding_box: GeoBoundingBox,
        zoom_levels: Vec<u8>,
        total_tiles: usize,
    ) -> Self {
        Self {
            bounding_box: Some(bounding_box),
            zoom_levels,
            total_tiles,
            completed_tiles: 0,
            cached_tiles: 0,
            failed_tiles: 0,
            state: JobState::Running,
            failure: None,
        }
    }

    pub(crate) fn rejected(
        bounding_box: Option<GeoBoundingBox>,
        zoom_levels: Vec<u8>,
        message: String,
    ) -> Self {
        Self {
            bounding_box,
            zoom_levels,
            total_tiles: 0,
            completed_tiles: 0,
            cached_tiles: 0,
            failed_tiles: 0,
            state: JobState::Failed,
            failure: Some(FailureReason::Validation(message)),
        }
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress::new(self.completed_tiles, self.total_tiles)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            state: self.state,
            total_tiles: self.total_tiles,
            attempted_tiles: self.completed_tiles,
            cached_tiles: self.cached_tiles,
            failed_tiles: self.failed_tiles,
            failure: self.failure.clone(),
        }
    }
}
