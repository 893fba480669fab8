//! Command-line configuration for tilestash.
//!
//! Every subcommand shares three argument groups:
//! - store: where tiles are kept on disk
//! - source: which tile server to fetch from
//! - job: zoom levels, concurrency and pacing
//!
//! # Environment Variables
//!
//! Options can also be set with the `TILESTASH_` prefix:
//!
//! - `TILESTASH_CACHE_DIR` - Tile directory (default: platform cache dir + `tilestash`)
//! - `TILESTASH_LAYER` - Preset layer: street, satellite, terrain (default: street)
//! - `TILESTASH_URL_TEMPLATE` - Custom `{z}/{x}/{y}` URL template, overrides the layer
//! - `TILESTASH_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `TILESTASH_ZOOM` - Comma-separated zoom levels (default: 13,14,15)
//! - `TILESTASH_CONCURRENCY` - Fetches per batch (default: 2)
//! - `TILESTASH_DELAY_MS` - Pause between batches (default: 100)
//! - `TILESTASH_MARGIN` - Boundary padding in degrees (default: 0.005)
//! - `TILESTASH_MAX_ZOOM` - Highest allowed zoom (default: the layer's maximum)
//! - `TILESTASH_MAX_TILES` - Most tiles one job may cover (default: 100000)
//! - `TILESTASH_HOST` / `TILESTASH_PORT` - Server bind address (default: 127.0.0.1:3000)
//! - `TILESTASH_CORS_ORIGINS` - Allowed CORS origins (comma-separated)
//! - `TILESTASH_CACHE_MAX_AGE` - Cache-Control max-age for served tiles (default: 86400)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::fetch::{TileLayer, UrlTemplate, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::geo::{GeoBoundingBox, DEFAULT_MARGIN_DEGREES, MAX_TILE_ZOOM};
use crate::job::{JobOptions, DEFAULT_MAX_TILES, DEFAULT_MAX_ZOOM};
use crate::server::{RouterConfig, DEFAULT_CACHE_MAX_AGE};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Directory name under the platform cache directory.
pub const CACHE_DIR_NAME: &str = "tilestash";

// =============================================================================
// CLI
// =============================================================================

/// tilestash - offline map tile cache.
///
/// Downloads slippy-map tiles covering an area into a local store and serves
/// them back over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilestash")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Cache every tile covering a bounding box
    Area(AreaConfig),

    /// Cache the padded bounding box of a GeoJSON polygon boundary
    Boundary(BoundaryConfig),

    /// Serve cached tiles and the caching API over HTTP
    Serve(ServeConfig),

    /// Print the number and total size of cached tiles
    Stats(StoreConfig),

    /// Remove every cached tile
    Clear(StoreConfig),
}

// =============================================================================
// Shared Argument Groups
// =============================================================================

/// Where tiles are stored.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Directory holding cached tiles.
    ///
    /// Defaults to the platform cache directory joined with `tilestash`.
    #[arg(long, env = "TILESTASH_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl StoreArgs {
    /// The configured directory, or the platform default.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, String> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join(CACHE_DIR_NAME))
            .ok_or_else(|| {
                "No platform cache directory found. Set --cache-dir or TILESTASH_CACHE_DIR"
                    .to_string()
            })
    }
}

/// Which tile server to fetch from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Preset tile layer.
    #[arg(long, value_enum, default_value_t = TileLayer::Street, env = "TILESTASH_LAYER")]
    pub layer: TileLayer,

    /// Custom tile URL template with {z}, {x}, {y} and optional {s}.
    ///
    /// Overrides --layer.
    #[arg(long, env = "TILESTASH_URL_TEMPLATE")]
    pub url_template: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, env = "TILESTASH_TIMEOUT_SECS")]
    pub timeout_secs: u64,
}

impl Default for SourceArgs {
    fn default() -> Self {
        Self {
            layer: TileLayer::Street,
            url_template: None,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl SourceArgs {
    /// The template to fetch from.
    pub fn template(&self) -> Result<UrlTemplate, String> {
        match &self.url_template {
            Some(pattern) => UrlTemplate::parse(pattern).map_err(|e| e.to_string()),
            None => Ok(self.layer.template()),
        }
    }

    /// Highest zoom the source serves when none is configured.
    pub fn default_max_zoom(&self) -> u8 {
        match self.url_template {
            Some(_) => DEFAULT_MAX_ZOOM,
            None => self.layer.max_zoom(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        self.template().map(|_| ())
    }
}

/// Zoom levels, concurrency and pacing.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Zoom levels to cache (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "13,14,15",
        env = "TILESTASH_ZOOM"
    )]
    pub zoom: Vec<u8>,

    /// Number of tiles fetched concurrently per batch.
    #[arg(long, default_value_t = 2, env = "TILESTASH_CONCURRENCY")]
    pub concurrency: usize,

    /// Pause between batches in milliseconds.
    #[arg(long, default_value_t = 100, env = "TILESTASH_DELAY_MS")]
    pub delay_ms: u64,

    /// Padding added around boundaries, in degrees.
    #[arg(long, default_value_t = DEFAULT_MARGIN_DEGREES, env = "TILESTASH_MARGIN")]
    pub margin: f64,

    /// Highest zoom level accepted (default: the layer's maximum).
    #[arg(long, env = "TILESTASH_MAX_ZOOM")]
    pub max_zoom: Option<u8>,

    /// Most tiles a single job may cover.
    #[arg(long, default_value_t = DEFAULT_MAX_TILES, env = "TILESTASH_MAX_TILES")]
    pub max_tiles: u64,
}

impl Default for JobArgs {
    fn default() -> Self {
        let options = JobOptions::default();
        Self {
            zoom: options.zoom_levels,
            concurrency: options.concurrency,
            delay_ms: options.inter_batch_delay.as_millis() as u64,
            margin: options.margin_degrees,
            max_zoom: None,
            max_tiles: options.max_tiles,
        }
    }
}

impl JobArgs {
    /// Job options for fetching from `source`.
    pub fn job_options(&self, source: &SourceArgs) -> JobOptions {
        JobOptions {
            zoom_levels: self.zoom.clone(),
            concurrency: self.concurrency,
            inter_batch_delay: Duration::from_millis(self.delay_ms),
            margin_degrees: self.margin,
            max_zoom: self.max_zoom.unwrap_or_else(|| source.default_max_zoom()),
            max_tiles: self.max_tiles,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.zoom.is_empty() {
            return Err("At least one zoom level is required (--zoom)".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(format!("margin must be finite and >= 0, got {}", self.margin));
        }
        if self.max_tiles == 0 {
            return Err("max_tiles must be greater than 0".to_string());
        }
        if let Some(max_zoom) = self.max_zoom {
            if max_zoom > MAX_TILE_ZOOM {
                return Err(format!(
                    "max_zoom must be at most {}, got {}",
                    MAX_TILE_ZOOM, max_zoom
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Subcommand Configurations
// =============================================================================

/// `tilestash area`
#[derive(Args, Debug, Clone)]
pub struct AreaConfig {
    /// Southern edge in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub min_lat: f64,

    /// Northern edge in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub max_lat: f64,

    /// Western edge in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub min_lng: f64,

    /// Eastern edge in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub max_lng: f64,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub job: JobArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl AreaConfig {
    pub fn bounding_box(&self) -> Result<GeoBoundingBox, String> {
        GeoBoundingBox::new(self.min_lat, self.max_lat, self.min_lng, self.max_lng)
            .map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        self.bounding_box()?;
        self.source.validate()?;
        self.job.validate()
    }
}

/// `tilestash boundary`
#[derive(Args, Debug, Clone)]
pub struct BoundaryConfig {
    /// GeoJSON file with a Polygon or MultiPolygon (bare or in a Feature).
    pub file: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub job: JobArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl BoundaryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.file.as_os_str().is_empty() {
            return Err("A boundary file is required".to_string());
        }
        self.source.validate()?;
        self.job.validate()
    }
}

/// `tilestash serve`
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILESTASH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILESTASH_PORT")]
    pub port: u16,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILESTASH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// HTTP Cache-Control max-age for served tiles, in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILESTASH_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub job: JobArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        self.source.validate()?;
        self.job.validate()
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn router_config(&self) -> RouterConfig {
        let mut config = RouterConfig::default()
            .with_cache_max_age(self.cache_max_age)
            .with_tracing(!self.no_tracing);
        if let Some(origins) = &self.cors_origins {
            config = config.with_cors_origins(origins.clone());
        }
        config
    }
}

/// `tilestash stats` and `tilestash clear`
#[derive(Args, Debug, Clone)]
pub struct StoreConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
