//! # tilestash
//!
//! An offline map tile cache.
//!
//! Given an area (a bounding box, or a GeoJSON polygon boundary padded into
//! one) and a set of zoom levels, tilestash enumerates every slippy-map tile
//! covering it, downloads them from a templated tile server at a polite pace
//! and keeps them in a local store. Cached tiles can then be served back over
//! HTTP without network access.
//!
//! ## Features
//!
//! - **Spherical Mercator tiling**: standard `z/x/y` slippy-map coordinates
//! - **Paced fetching**: fixed-size batches with a pause between them
//! - **Pluggable storage**: in-memory and on-disk tile stores
//! - **Single active job**: progress, cancellation and a summary per job
//! - **HTTP API**: serve cached tiles and start or cancel jobs
//!
//! ## Architecture
//!
//! - [`geo`] - Projection, bounding boxes, tile enumeration, boundaries
//! - [`store`] - Tile keys and the storage capability
//! - [`fetch`] - URL templates, HTTP fetcher and batch scheduler
//! - [`job`] - Cache manager, job state and progress
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilestash::{CacheManager, GeoBoundingBox, HttpTileFetcher, JobOptions, MemoryTileStore, TileLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CacheManager::new(
//!         Arc::new(MemoryTileStore::new()),
//!         Arc::new(HttpTileFetcher::new()?),
//!         TileLayer::Street.template(),
//!         JobOptions::default(),
//!     )?;
//!
//!     let bbox = GeoBoundingBox::new(51.50, 51.51, -0.13, -0.12)?;
//!     let summary = manager.cache_area(bbox, &[13, 14, 15]).await?;
//!     println!("cached {} of {} tiles", summary.cached_tiles, summary.total_tiles);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod job;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{
    AreaConfig, BoundaryConfig, Cli, Command, JobArgs, ServeConfig, SourceArgs, StoreArgs,
    StoreConfig,
};
pub use error::{FetchError, JobError, StoreError, ValidationError};
pub use fetch::{
    CancelToken, FetchScheduler, FetchTask, HttpTileFetcher, Pacer, ScheduleReport,
    SchedulerConfig, StopReason, TileFetcher, TileLayer, TokioPacer, UrlTemplate,
};
pub use geo::{
    count_tiles, enumerate, resolve, tile_bounds, tile_contains, to_tile, GeoBoundingBox, Geometry,
    TileCoordinate, TileRange,
};
pub use job::{
    CacheJob, CacheManager, FailureReason, JobOptions, JobProgress, JobState, JobSummary,
};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use store::{format_bytes, DiskTileStore, MemoryTileStore, TileKey, TileStore};
