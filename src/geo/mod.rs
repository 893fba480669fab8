//! Geographic math for the tile cache.
//!
//! Everything here is pure: no I/O, no shared state.
//!
//! ```text
//!  GeoJSON boundary ──► boundary::resolve ──► GeoBoundingBox
//!                                                  │
//!                                   zoom levels ──►│
//!                                                  ▼
//!                                       enumerate::enumerate
//!                                                  │
//!                                                  ▼
//!                                       Vec<TileCoordinate>
//! ```
//!
//! - [`projector`]: lat/lon ↔ tile conversions (spherical Mercator)
//! - [`bbox`]: validated bounding boxes
//! - [`enumerate`]: tile rectangles covering a box at each zoom
//! - [`boundary`]: polygon / multi-polygon boundaries and their padded boxes

pub mod bbox;
pub mod boundary;
pub mod enumerate;
pub mod projector;

pub use bbox::GeoBoundingBox;
pub use boundary::{resolve, Geometry, Position, Ring, DEFAULT_MARGIN_DEGREES};
pub use enumerate::{count_tiles, enumerate, enumerate_zoom, TileRange};
pub use projector::{
    tile_bounds, tile_contains, tiles_per_axis, to_tile, TileCoordinate, MAX_MERCATOR_LAT,
    MAX_TILE_ZOOM,
};
