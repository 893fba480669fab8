//! HTTP surface over the [`CacheManager`](crate::job::CacheManager).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /tiles/{z}/{x}/{y}      POST /cache/area|boundary       │
//! │                                                                 │
//! │  ┌───────────────────────┐        ┌──────────────────────────┐  │
//! │  │       handlers        │        │          routes          │  │
//! │  │ (requests, errors)    │        │  (router, CORS, tracing) │  │
//! │  └───────────┬───────────┘        └──────────────────────────┘  │
//! └──────────────┼──────────────────────────────────────────────────┘
//!                ▼
//!        Arc<CacheManager>
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    sniff_content_type, AppState, AreaRequest, BoundaryRequest, CacheStatsResponse,
    CancelResponse, ErrorResponse, HealthResponse, ProgressResponse, TilePathParams,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE};
