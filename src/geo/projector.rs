//! Spherical Mercator projection between geographic and tile coordinates.
//!
//! Tiles follow the slippy-map (XYZ) scheme: zoom `z` divides the world into
//! `2^z × 2^z` tiles, `x` grows eastward from the antimeridian and `y` grows
//! southward from the northern Mercator limit.

use std::f64::consts::PI;
use std::fmt;

use serde::Serialize;

use crate::error::ValidationError;

use super::bbox::GeoBoundingBox;

/// Northernmost latitude representable in Web Mercator (degrees).
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Highest zoom the projector computes.
///
/// At this zoom `2^zoom - 1` still fits a `u32` tile index.
pub const MAX_TILE_ZOOM: u8 = 30;

// =============================================================================
// Tile Coordinate
// =============================================================================

/// A tile in the slippy-map grid.
///
/// Always satisfies `x < 2^zoom` and `y < 2^zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoordinate {
    zoom: u8,
    x: u32,
    y: u32,
}

impl TileCoordinate {
    /// Create a tile coordinate, rejecting indices outside the zoom's grid.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, ValidationError> {
        if zoom > MAX_TILE_ZOOM {
            return Err(ValidationError::ZoomOutOfRange {
                zoom,
                max: MAX_TILE_ZOOM,
            });
        }
        let n = tiles_per_axis(zoom);
        if x >= n || y >= n {
            return Err(ValidationError::InvalidTileKey(format!(
                "tile ({}, {}) is outside the {}x{} grid at zoom {}",
                x, y, n, n, zoom
            )));
        }
        Ok(Self { zoom, x, y })
    }

    /// Build from indices already known to lie on the grid.
    pub(crate) fn from_parts(zoom: u8, x: u32, y: u32) -> Self {
        debug_assert!(x < tiles_per_axis(zoom) && y < tiles_per_axis(zoom));
        Self { zoom, x, y }
    }

    /// Zoom level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Column, counted eastward from 180°W.
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row, counted southward from the northern Mercator limit.
    pub fn y(&self) -> u32 {
        self.y
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_TILE_ZOOM)
}

/// Project a geographic point onto the tile grid.
///
/// Latitude is clamped to the Mercator limits and longitude to ±180° before
/// projecting; the resulting indices are then clamped into `[0, 2^zoom)`, so
/// out-of-range or non-finite input still yields a deterministic tile on the
/// grid edge. Zooms above [`MAX_TILE_ZOOM`] are treated as `MAX_TILE_ZOOM`.
pub fn to_tile(lat: f64, lon: f64, zoom: u8) -> TileCoordinate {
    let zoom = zoom.min(MAX_TILE_ZOOM);
    let n = tiles_per_axis(zoom);
    let scale = n as f64;

    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let lon = lon.clamp(-180.0, 180.0);

    let x = ((lon + 180.0) / 360.0 * scale).floor();
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * scale).floor();

    TileCoordinate {
        zoom,
        x: clamp_index(x, n),
        y: clamp_index(y, n),
    }
}

/// Whether `(lat, lon)` falls inside `tile`.
///
/// A point is inside a tile exactly when it projects to that tile at the
/// tile's zoom, so this never disagrees with [`to_tile`].
pub fn tile_contains(tile: &TileCoordinate, lat: f64, lon: f64) -> bool {
    to_tile(lat, lon, tile.zoom) == *tile
}

/// Geographic extent of a tile.
///
/// The north/west edges belong to the tile; the south/east edges belong to
/// its neighbours.
pub fn tile_bounds(tile: &TileCoordinate) -> GeoBoundingBox {
    let scale = tiles_per_axis(tile.zoom) as f64;

    let west = tile.x as f64 / scale * 360.0 - 180.0;
    let east = (tile.x + 1) as f64 / scale * 360.0 - 180.0;
    let north = row_to_lat(tile.y as f64, scale);
    let south = row_to_lat((tile.y + 1) as f64, scale);

    GeoBoundingBox::from_edges(south, north, west, east)
}

/// Inverse Mercator for a (possibly fractional) row index.
fn row_to_lat(row: f64, scale: f64) -> f64 {
    (PI * (1.0 - 2.0 * row / scale)).sinh().atan().to_degrees()
}

/// Clamp a floored axis value into `[0, n)`. NaN maps to 0.
#[inline]
fn clamp_index(value: f64, n: u32) -> u32 {
    (value as i64).clamp(0, n as i64 - 1) as u32
}

// =============================================================================
// Tests
// =============================================================================
