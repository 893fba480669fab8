//! Tile URL templates and built-in layer presets.
//!
//! A template is an XYZ URL with `{z}`, `{x}` and `{y}` placeholders, plus an
//! optional `{s}` subdomain placeholder:
//!
//! ```text
//! https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png
//!            │                        │   │   │
//!            │                        │   │   └── row (grows south)
//!            │                        │   └────── column (grows east)
//!            │                        └────────── zoom
//!            └─────────────────────────────────── a | b | c
//! ```

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use url::Url;

use crate::error::ValidationError;
use crate::geo::TileCoordinate;

/// Subdomains substituted for `{s}`.
const SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

const REQUIRED_PLACEHOLDERS: [&str; 3] = ["{z}", "{x}", "{y}"];

// =============================================================================
// Layer Presets
// =============================================================================

/// Built-in tile sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TileLayer {
    /// OpenStreetMap standard street map
    #[default]
    Street,
    /// Esri World Imagery
    Satellite,
    /// OpenTopoMap topographic map
    Terrain,
}

impl TileLayer {
    /// URL template for this layer.
    pub fn url_template(&self) -> &'static str {
        match self {
            TileLayer::Street => "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            TileLayer::Satellite => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
            TileLayer::Terrain => "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
        }
    }

    /// Highest zoom the layer serves.
    pub fn max_zoom(&self) -> u8 {
        match self {
            TileLayer::Street => 19,
            TileLayer::Satellite => 19,
            TileLayer::Terrain => 17,
        }
    }

    /// Parsed template for this layer.
    pub fn template(&self) -> UrlTemplate {
        UrlTemplate {
            pattern: self.url_template().to_string(),
        }
    }
}

// =============================================================================
// URL Template
// =============================================================================

/// A validated XYZ tile URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    pattern: String,
}

impl UrlTemplate {
    /// Parse and validate a template.
    ///
    /// Fails when a required placeholder is missing or when a rendered URL
    /// is not an absolute `http`/`https` URL.
    pub fn parse(pattern: &str) -> Result<Self, ValidationError> {
        for placeholder in REQUIRED_PLACEHOLDERS {
            if !pattern.contains(placeholder) {
                return Err(ValidationError::InvalidTemplate(format!(
                    "missing {} in {}",
                    placeholder, pattern
                )));
            }
        }

        let template = Self {
            pattern: pattern.to_string(),
        };

        let sample = template.render(&TileCoordinate::from_parts(0, 0, 0));
        let url = Url::parse(&sample).map_err(|e| {
            ValidationError::InvalidTemplate(format!("{}: {}", pattern, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ValidationError::InvalidTemplate(format!(
                "{} is not an http(s) URL",
                pattern
            )));
        }

        Ok(template)
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// URL of `tile`.
    ///
    /// `{s}` rotates through the subdomains by `(x + y) mod 3`, so a given
    /// tile always maps to the same host.
    pub fn render(&self, tile: &TileCoordinate) -> String {
        let subdomain = SUBDOMAINS[((tile.x() as u64 + tile.y() as u64) % 3) as usize];
        self.pattern
            .replace("{s}", subdomain)
            .replace("{z}", &tile.zoom().to_string())
            .replace("{x}", &tile.x().to_string())
            .replace("{y}", &tile.y().to_string())
    }
}

impl FromStr for UrlTemplate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl From<TileLayer> for UrlTemplate {
    fn from(layer: TileLayer) -> Self {
        layer.template()
    }
}

// =============================================================================
// Tests
// =============================================================================
