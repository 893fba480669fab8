use thiserror::Error;

/// Errors raised while validating a caching request.
///
/// These are fatal to the job that raised them and are surfaced before any
/// tile is fetched or written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The request did not name any zoom level
    #[error("At least one zoom level is required")]
    EmptyZoomLevels,

    /// A zoom level is beyond what the tile source serves
    #[error("Zoom level {zoom} is out of range (max: {max})")]
    ZoomOutOfRange { zoom: u8, max: u8 },

    /// Bounding box edges are reversed or not finite
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Polygon boundary is empty or malformed
    #[error("Invalid boundary: {0}")]
    InvalidBoundary(String),

    /// Margin must be a finite, non-negative number of degrees
    #[error("Invalid margin: {0} (must be finite and >= 0)")]
    InvalidMargin(f64),

    /// Tile URL template is missing a placeholder or is not an http(s) URL
    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),

    /// A store key does not have the `tile_{zoom}_{x}_{y}` shape
    #[error("Invalid tile key: {0}")]
    InvalidTileKey(String),

    /// Fetch concurrency must be at least one
    #[error("Concurrency must be greater than 0")]
    InvalidConcurrency,

    /// The request covers more tiles than one job may fetch
    #[error("Request covers {count} tiles (max: {max})")]
    TooManyTiles { count: u64, max: u64 },

    /// The per-job tile limit must be at least one
    #[error("Tile limit must be greater than 0")]
    InvalidTileLimit,
}

/// Errors from retrieving a single tile over the network.
///
/// A fetch error is local to its tile: the scheduler logs and counts it and
/// carries on with the rest of the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Connection, DNS or timeout failure
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// The tile server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be read
    #[error("Failed to read body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Errors from the persistent tile store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// An operation on a single entry failed
    #[error("Store I/O error for {key}: {message}")]
    Io { key: String, message: String },

    /// The store as a whole cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error means no further writes can succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors returned by the cache job controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    /// Another job is still running on this controller
    #[error("A caching job is already active")]
    AlreadyActive,

    /// The request was rejected before any work started
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store failed outside of a tile fetch
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
