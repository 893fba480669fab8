//! HTTP request handlers for the tile cache API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /tiles/{z}/{x}/{y}` - Serve a cached tile (`{y}` may end in `.png`/`.jpg`)
//! - `GET /cache` - Tile count and size of the store
//! - `DELETE /cache` - Clear the store
//! - `POST /cache/area` - Start caching a bounding box
//! - `POST /cache/boundary` - Start caching a GeoJSON boundary
//! - `GET /cache/progress` - Progress of the running or last job
//! - `POST /cache/cancel` - Cancel the running job

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{JobError, StoreError, ValidationError};
use crate::geo::{GeoBoundingBox, Geometry, TileCoordinate};
use crate::job::{CacheManager, JobState, JobSummary};
use crate::store::{format_bytes, TileKey};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,

    /// Cache-Control max-age for served tiles, in seconds
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(manager: Arc<CacheManager>, cache_max_age: u32) -> Self {
        Self {
            manager,
            cache_max_age,
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Path parameters for tile requests: `/tiles/{z}/{x}/{filename}` where
/// filename is `{y}`, `{y}.png` or `{y}.jpg`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub z: u8,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Row index with any image extension stripped.
    pub fn y(&self) -> Result<u32, std::num::ParseIntError> {
        let y = self
            .filename
            .strip_suffix(".png")
            .or_else(|| self.filename.strip_suffix(".jpg"))
            .unwrap_or(&self.filename);
        y.parse()
    }
}

/// Body of `POST /cache/area`.
#[derive(Debug, Deserialize)]
pub struct AreaRequest {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    /// Defaults to the manager's configured zoom levels
    #[serde(default)]
    pub zoom_levels: Option<Vec<u8>>,
}

/// Body of `POST /cache/boundary`.
#[derive(Debug, Deserialize)]
pub struct BoundaryRequest {
    /// GeoJSON `Polygon`/`MultiPolygon`, bare or wrapped in a `Feature`
    pub boundary: serde_json::Value,
    #[serde(default)]
    pub zoom_levels: Option<Vec<u8>>,
    /// Padding in degrees; defaults to the manager's configured margin
    #[serde(default)]
    pub margin: Option<f64>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "job_active")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }

    fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from `GET /cache`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    /// Number of stored tiles
    pub tiles: usize,
    pub size_bytes: u64,
    /// Human readable size, e.g. "1.5 MB"
    pub size: String,
}

/// Response from the progress, area and boundary endpoints.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub state: JobState,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    /// Present once the job has ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
}

/// Response from `POST /cache/cancel`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert JobError to HTTP response.
///
/// 4xx errors are logged at WARN (409 at DEBUG), 5xx errors at ERROR.
impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            JobError::AlreadyActive => (StatusCode::CONFLICT, "job_active"),
            JobError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            JobError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            JobError::Store(StoreError::Io { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }
        };
        let message = match &self {
            JobError::Validation(e) => e.to_string(),
            JobError::Store(e) => e.to_string(),
            JobError::AlreadyActive => self.to_string(),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::CONFLICT {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Conflict: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        ErrorResponse::with_status(error_type, message, status).into_response_with(status)
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        JobError::Store(self).into_response()
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        JobError::Validation(self).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// `GET /health` returns `{"status": "healthy", "version": "..."}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Serve a cached tile.
///
/// # Response
///
/// - `200 OK`: the stored payload, `Content-Type` sniffed from its magic bytes
/// - `400 Bad Request`: malformed row or tile outside the zoom's grid
/// - `404 Not Found`: tile is not cached
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, JobError> {
    let y = params.y().map_err(|_| {
        ValidationError::InvalidTileKey(format!("{}/{}/{}", params.z, params.x, params.filename))
    })?;
    let tile = TileCoordinate::new(params.z, params.x, y)?;
    let key = TileKey::from(tile);

    let Some(blob) = state.manager.get_cached_tile(&key).await? else {
        debug!(tile = %tile, "Tile not cached");
        let status = StatusCode::NOT_FOUND;
        return Ok(ErrorResponse::with_status(
            "not_found",
            format!("Tile {} is not cached", tile),
            status,
        )
        .into_response_with(status));
    };

    let headers = [
        (header::CONTENT_TYPE, sniff_content_type(&blob).to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
    ];
    Ok((StatusCode::OK, headers, blob).into_response())
}

/// Report the number of cached tiles and their total size.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<CacheStatsResponse>, StoreError> {
    let tiles = state.manager.cached_tile_count().await?;
    let size_bytes = state.manager.cache_size_bytes().await?;
    Ok(Json(CacheStatsResponse {
        tiles,
        size_bytes,
        size: format_bytes(size_bytes),
    }))
}

/// Clear the store.
///
/// `204 No Content`, or `409 Conflict` while a job is running.
pub async fn clear_handler(State(state): State<AppState>) -> Result<StatusCode, JobError> {
    state.manager.clear_cache().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start caching a bounding box in the background.
///
/// `202 Accepted` with the new job's progress, `400` when the request is
/// invalid, `409` when a job is already running.
pub async fn cache_area_handler(
    State(state): State<AppState>,
    Json(request): Json<AreaRequest>,
) -> Result<(StatusCode, Json<ProgressResponse>), JobError> {
    let bbox = GeoBoundingBox::new(
        request.min_lat,
        request.max_lat,
        request.min_lng,
        request.max_lng,
    )?;
    let zoom_levels = request
        .zoom_levels
        .unwrap_or_else(|| state.manager.options().zoom_levels.clone());

    // The job runs detached; its outcome is read back through /cache/progress
    let _job = state.manager.spawn_area(bbox, &zoom_levels).await?;

    Ok((StatusCode::ACCEPTED, Json(progress_response(&state).await)))
}

/// Start caching a GeoJSON boundary in the background.
///
/// Same status codes as [`cache_area_handler`].
pub async fn cache_boundary_handler(
    State(state): State<AppState>,
    Json(request): Json<BoundaryRequest>,
) -> Result<(StatusCode, Json<ProgressResponse>), JobError> {
    let geometry = Geometry::from_geojson_value(request.boundary)?;
    let zoom_levels = request
        .zoom_levels
        .unwrap_or_else(|| state.manager.options().zoom_levels.clone());

    let _job = state
        .manager
        .spawn_boundary(&geometry, &zoom_levels, request.margin)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(progress_response(&state).await)))
}

/// Progress of the running or last job.
pub async fn progress_handler(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(progress_response(&state).await)
}

/// Request cancellation of the running job.
///
/// `202 Accepted` when a running job was signalled, `409 Conflict` otherwise.
pub async fn cancel_handler(State(state): State<AppState>) -> Response {
    if state.manager.cancel().await {
        (StatusCode::ACCEPTED, Json(CancelResponse { cancelled: true })).into_response()
    } else {
        let status = StatusCode::CONFLICT;
        ErrorResponse::with_status("no_active_job", "No caching job is running", status)
            .into_response_with(status)
    }
}

async fn progress_response(state: &AppState) -> ProgressResponse {
    match state.manager.current_job().await {
        Some(job) => {
            let progress = job.progress();
            ProgressResponse {
                state: job.state,
                completed: progress.completed,
                total: progress.total,
                percent: progress.percent,
                summary: job.state.is_terminal().then(|| job.summary()),
            }
        }
        None => ProgressResponse {
            state: JobState::Idle,
            completed: 0,
            total: 0,
            percent: 0.0,
            summary: None,
        },
    }
}

/// Guess an image content type from the payload's leading bytes.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];

    if data.starts_with(PNG) {
        "image/png"
    } else if data.starts_with(JPEG) {
        "image/jpeg"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

// =============================================================================
// Tests
// =============================================================================
