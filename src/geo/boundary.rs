//! Polygon boundaries and their padded bounding boxes.
//!
//! Boundaries arrive as GeoJSON geometries, where every position is
//! `[longitude, latitude]` (optionally followed by an altitude, which is
//! ignored).

use serde::Deserialize;

use crate::error::ValidationError;

use super::bbox::GeoBoundingBox;

/// Default padding added around a boundary, in degrees (about 500 m).
pub const DEFAULT_MARGIN_DEGREES: f64 = 0.005;

/// A single `[lon, lat]` position.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [lon, lat, ..] => Ok(Self::new(*lon, *lat)),
            _ => Err(format!(
                "position needs at least [lon, lat], got {} value(s)",
                values.len()
            )),
        }
    }
}

/// A closed ring of positions.
pub type Ring = Vec<Position>;

/// Boundary geometry.
///
/// A polygon is an outer ring followed by any holes; a multi-polygon is a
/// list of polygons.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

/// GeoJSON inputs accepted by [`Geometry::from_geojson`].
#[derive(Deserialize)]
#[serde(untagged)]
enum GeoJsonInput {
    Feature { geometry: Geometry },
    Geometry(Geometry),
}

impl GeoJsonInput {
    fn into_geometry(self) -> Geometry {
        match self {
            GeoJsonInput::Feature { geometry } => geometry,
            GeoJsonInput::Geometry(geometry) => geometry,
        }
    }
}

impl Geometry {
    /// Parse a GeoJSON `Polygon` or `MultiPolygon`, bare or wrapped in a
    /// `Feature`.
    pub fn from_geojson(text: &str) -> Result<Self, ValidationError> {
        let input: GeoJsonInput = serde_json::from_str(text)
            .map_err(|e| ValidationError::InvalidBoundary(e.to_string()))?;
        Ok(input.into_geometry())
    }

    /// Same as [`Geometry::from_geojson`] for an already parsed JSON value.
    pub fn from_geojson_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        let input: GeoJsonInput = serde_json::from_value(value)
            .map_err(|e| ValidationError::InvalidBoundary(e.to_string()))?;
        Ok(input.into_geometry())
    }

    /// All positions across every ring.
    pub fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Geometry::Polygon(rings) => Box::new(rings.iter().flatten()),
            Geometry::MultiPolygon(polygons) => {
                Box::new(polygons.iter().flatten().flatten())
            }
        }
    }
}

/// Bounding box of `geometry`, grown by `margin_degrees` on every side.
///
/// Fails with [`ValidationError::InvalidBoundary`] when the geometry has no
/// positions or a position is not finite.
pub fn resolve(geometry: &Geometry, margin_degrees: f64) -> Result<GeoBoundingBox, ValidationError> {
    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lng = f64::INFINITY;
    let mut max_lng = f64::NEG_INFINITY;
    let mut found = false;

    for position in geometry.positions() {
        if !position.lat.is_finite() || !position.lon.is_finite() {
            return Err(ValidationError::InvalidBoundary(format!(
                "non-finite position [{}, {}]",
                position.lon, position.lat
            )));
        }
        found = true;
        min_lat = min_lat.min(position.lat);
        max_lat = max_lat.max(position.lat);
        min_lng = min_lng.min(position.lon);
        max_lng = max_lng.max(position.lon);
    }

    if !found {
        return Err(ValidationError::InvalidBoundary(
            "boundary contains no coordinates".to_string(),
        ));
    }

    GeoBoundingBox::new(min_lat, max_lat, min_lng, max_lng)?.expand(margin_degrees)
}
