use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ValidationError;
use crate::geo::TileCoordinate;

/// Prefix shared by every tile key.
pub const TILE_KEY_PREFIX: &str = "tile_";

/// Store key for a tile: `tile_{zoom}_{x}_{y}`.
///
/// Keys are built from a [`TileCoordinate`] and parse back into one, so two
/// distinct coordinates never share a key. Keys order by coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    tile: TileCoordinate,
    text: String,
}

impl TileKey {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The coordinate this key names.
    pub fn coordinate(&self) -> TileCoordinate {
        self.tile
    }
}

impl From<TileCoordinate> for TileKey {
    fn from(tile: TileCoordinate) -> Self {
        let text = format!(
            "{}{}_{}_{}",
            TILE_KEY_PREFIX,
            tile.zoom(),
            tile.x(),
            tile.y()
        );
        Self { tile, text }
    }
}

impl From<&TileCoordinate> for TileKey {
    fn from(tile: &TileCoordinate) -> Self {
        Self::from(*tile)
    }
}

impl FromStr for TileKey {
    type Err = ValidationError;

    /// Parse a key, accepting only the canonical form produced by
    /// `From<TileCoordinate>` (no leading zeros, no sign).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (zoom, x, y) =
            parse_parts(s).ok_or_else(|| ValidationError::InvalidTileKey(s.to_string()))?;
        let tile = TileCoordinate::new(zoom, x, y)
            .map_err(|_| ValidationError::InvalidTileKey(s.to_string()))?;
        Ok(Self::from(tile))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for TileKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

fn parse_parts(s: &str) -> Option<(u8, u32, u32)> {
    let rest = s.strip_prefix(TILE_KEY_PREFIX)?;
    let mut parts = rest.split('_');
    let zoom = parse_canonical(parts.next()?)?;
    let x = parse_canonical(parts.next()?)?;
    let y = parse_canonical(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((u8::try_from(zoom).ok()?, x, y))
}

fn parse_canonical(part: &str) -> Option<u32> {
    let canonical = !part.is_empty()
        && part.bytes().all(|b| b.is_ascii_digit())
        && (part == "0" || !part.starts_with('0'));
    if canonical {
        part.parse().ok()
    } else {
        None
    }
}
