//! Bounding box of the footprint being processed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// Errors raised when building an extent.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtentError {
    /// The box has zero (or negative) width or height.
    #[error("Degenerate extent: x {min_x}..{max_x}, y {min_y}..{max_y}")]
    Degenerate {
        /// Minimum x.
        min_x: f64,
        /// Minimum y.
        min_y: f64,
        /// Maximum x.
        max_x: f64,
        /// Maximum y.
        max_y: f64,
    },

    /// One of the coordinates is NaN or infinite.
    #[error("Extent contains a non-finite coordinate")]
    NonFinite,
}

/// An axis-aligned bounding box tagged with its reference system.
///
/// The constructor guarantees `min_x < max_x` and `min_y < max_y`; there are
/// no setters, so the invariant holds for the lifetime of the value.
/// Deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExtentFields")]
pub struct GeoExtent {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    epsg: u32,
}

/// Unchecked wire form of [`GeoExtent`].
#[derive(Deserialize)]
struct ExtentFields {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    epsg: u32,
}

impl TryFrom<ExtentFields> for GeoExtent {
    type Error = ExtentError;

    fn try_from(f: ExtentFields) -> Result<Self, Self::Error> {
        GeoExtent::new(f.min_x, f.min_y, f.max_x, f.max_y, f.epsg)
    }
}

impl GeoExtent {
    /// Create an extent, rejecting empty and non-finite boxes.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, epsg: u32) -> Result<Self, ExtentError> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(ExtentError::NonFinite);
        }
        if min_x >= max_x || min_y >= max_y {
            return Err(ExtentError::Degenerate {
                min_x,
                min_y,
                max_x,
                max_y,
            });
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            epsg,
        })
    }

    /// Minimum x (west edge for geographic extents).
    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    /// Minimum y (south edge for geographic extents).
    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    /// Maximum x (east edge for geographic extents).
    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    /// Maximum y (north edge for geographic extents).
    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    /// EPSG code of the reference system the coordinates are expressed in.
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Whether the coordinates are WGS84 longitude/latitude.
    pub fn is_geographic(&self) -> bool {
        self.epsg == EPSG_WGS84
    }

    /// Width of the box in CRS units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the box in CRS units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Centre point `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if a point lies inside the box (edges included).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}
