//! Geographic bounding boxes.

use serde::Serialize;

use crate::error::ValidationError;

/// Axis-aligned latitude/longitude rectangle, in degrees.
///
/// Always satisfies `min_lat <= max_lat` and `min_lng <= max_lng` with every
/// edge finite. Edges may lie outside ±90/±180 after padding; projection
/// clamps them onto the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl GeoBoundingBox {
    /// Create a bounding box, validating edge order.
    pub fn new(
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    ) -> Result<Self, ValidationError> {
        let edges = [min_lat, max_lat, min_lng, max_lng];
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(ValidationError::InvalidBoundingBox(
                "edges must be finite numbers".to_string(),
            ));
        }
        if min_lat > max_lat {
            return Err(ValidationError::InvalidBoundingBox(format!(
                "min_lat {} is greater than max_lat {}",
                min_lat, max_lat
            )));
        }
        if min_lng > max_lng {
            return Err(ValidationError::InvalidBoundingBox(format!(
                "min_lng {} is greater than max_lng {}",
                min_lng, max_lng
            )));
        }
        Ok(Self::from_edges(min_lat, max_lat, min_lng, max_lng))
    }

    /// Build from edges already known to be ordered.
    pub(crate) fn from_edges(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    pub fn min_lng(&self) -> f64 {
        self.min_lng
    }

    pub fn max_lng(&self) -> f64 {
        self.max_lng
    }

    /// Midpoint as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Grow the box outward by `margin` degrees on every side.
    pub fn expand(&self, margin: f64) -> Result<Self, ValidationError> {
        if !margin.is_finite() || margin < 0.0 {
            return Err(ValidationError::InvalidMargin(margin));
        }
        Ok(Self::from_edges(
            self.min_lat - margin,
            self.max_lat + margin,
            self.min_lng - margin,
            self.max_lng + margin,
        ))
    }
}
