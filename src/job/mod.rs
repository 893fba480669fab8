//! Caching jobs.
//!
//! A job turns an area (a bounding box, or a polygon boundary padded into
//! one) and a set of zoom levels into store writes:
//!
//! ```text
//!  GeoBoundingBox ─┐
//!                  ├─► CacheManager ─► enumerate ─► FetchScheduler ─► TileStore
//!  Geometry ───────┘        │
//!                           └─► JobProgress / JobSummary
//! ```
//!
//! The [`CacheManager`] is the only owner of job state.

mod controller;
mod progress;

pub use controller::{
    CacheManager, JobOptions, DEFAULT_MAX_TILES, DEFAULT_MAX_ZOOM, DEFAULT_ZOOM_LEVELS,
};
pub use progress::{CacheJob, FailureReason, JobProgress, JobState, JobSummary};
