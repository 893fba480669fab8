//! Turning a bounding box and zoom levels into the tiles that cover it.

use super::bbox::GeoBoundingBox;
use super::projector::{to_tile, TileCoordinate};

/// Inclusive rectangle of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles covering `bbox` at `zoom`.
    ///
    /// Rows grow southward, so the north edge gives `min_y` and the south edge
    /// gives `max_y`.
    pub fn covering(bbox: &GeoBoundingBox, zoom: u8) -> Self {
        let north_west = to_tile(bbox.max_lat(), bbox.min_lng(), zoom);
        let south_east = to_tile(bbox.min_lat(), bbox.max_lng(), zoom);

        Self {
            zoom: north_west.zoom(),
            min_x: north_west.x(),
            max_x: south_east.x(),
            min_y: north_west.y(),
            max_y: south_east.y(),
        }
    }

    /// Columns in the range; zero when the x bounds are inverted.
    pub fn width(&self) -> u64 {
        span(self.min_x, self.max_x)
    }

    pub fn height(&self) -> u64 {
        span(self.min_y, self.max_y)
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles in column-major order (x outer, y inner).
    pub fn tiles(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (self.min_x..=self.max_x).flat_map(move |x| {
            (self.min_y..=self.max_y).map(move |y| TileCoordinate::from_parts(self.zoom, x, y))
        })
    }
}

fn span(min: u32, max: u32) -> u64 {
    max.checked_sub(min).map_or(0, |d| d as u64 + 1)
}

/// Every tile covering `bbox` at a single zoom, each exactly once.
pub fn enumerate_zoom(bbox: &GeoBoundingBox, zoom: u8) -> Vec<TileCoordinate> {
    TileRange::covering(bbox, zoom).tiles().collect()
}

/// Union of [`enumerate_zoom`] over `zoom_levels`.
///
/// Zooms are visited in the order given with repeats skipped, so the output
/// is deterministic for a given input.
pub fn enumerate(bbox: &GeoBoundingBox, zoom_levels: &[u8]) -> Vec<TileCoordinate> {
    let mut seen = [false; 256];
    let mut tiles = Vec::new();
    for &zoom in zoom_levels {
        if std::mem::replace(&mut seen[zoom as usize], true) {
            continue;
        }
        tiles.extend(TileRange::covering(bbox, zoom).tiles());
    }
    tiles
}

/// Total tile count for `zoom_levels` without materializing the tiles.
pub fn count_tiles(bbox: &GeoBoundingBox, zoom_levels: &[u8]) -> u64 {
    let mut seen = [false; 256];
    zoom_levels
        .iter()
        .filter(|&&zoom| !std::mem::replace(&mut seen[zoom as usize], true))
        .map(|&zoom| TileRange::covering(bbox, zoom).len())
        .sum()
}
