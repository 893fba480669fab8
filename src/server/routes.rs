//! Router configuration for the tile cache API.
//!
//! # Route Structure
//!
//! ```text
//! /health                    GET     - Health check
//! /tiles/{z}/{x}/{y}         GET     - Cached tile ({y}, {y}.png or {y}.jpg)
//! /cache                     GET     - Store statistics
//! /cache                     DELETE  - Clear the store
//! /cache/area                POST    - Start caching a bounding box
//! /cache/boundary            POST    - Start caching a GeoJSON boundary
//! /cache/progress            GET     - Job progress
//! /cache/cancel              POST    - Cancel the running job
//! ```
//!
//! # Example
//!
//! ```ignore
//! let manager = Arc::new(CacheManager::new(store, fetcher, template, JobOptions::default())?);
//! let router = create_router(manager, RouterConfig::default().with_cache_max_age(3600));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::job::CacheManager;

use super::handlers::{
    cache_area_handler, cache_boundary_handler, cancel_handler, clear_handler, health_handler,
    progress_handler, stats_handler, tile_handler, AppState,
};

/// Default Cache-Control max-age for served tiles: one day.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86_400;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// # Arguments
///
/// * `manager` - The cache manager every route operates on
/// * `config` - Router configuration
pub fn create_router(manager: Arc<CacheManager>, config: RouterConfig) -> Router {
    let state = AppState::new(manager, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // {filename} captures both "{y}" and "{y}.png"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/tiles/{z}/{x}/{filename}", get(tile_handler))
        .route("/cache", get(stats_handler).delete(clear_handler))
        .route("/cache/area", post(cache_area_handler))
        .route("/cache/boundary", post(cache_boundary_handler))
        .route("/cache/progress", get(progress_handler))
        .route("/cache/cancel", post(cancel_handler))
        .with_state(state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
