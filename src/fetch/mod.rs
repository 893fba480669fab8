//! Tile retrieval.
//!
//! ```text
//! TileCoordinate ──► UrlTemplate::render ──► FetchTask
//!                                               │
//!                                               ▼
//!                                  ┌──────────────────────────┐
//!                                  │      FetchScheduler      │
//!                                  │  batches of N, paced     │
//!                                  └─────┬──────────────┬─────┘
//!                                        │              │
//!                                        ▼              ▼
//!                               dyn TileFetcher   dyn TileStore
//!                               (HttpTileFetcher)
//! ```

mod http;
mod scheduler;
mod template;

pub use http::{HttpTileFetcher, TileFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
pub use scheduler::{
    CancelToken, FetchScheduler, FetchTask, Pacer, ScheduleReport, SchedulerConfig, StopReason,
    TokioPacer, DEFAULT_CONCURRENCY, DEFAULT_INTER_BATCH_DELAY,
};
pub use template::{TileLayer, UrlTemplate};
