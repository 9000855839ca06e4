//! # slopemap-terrain
//!
//! Raster processing stages of the slope pipeline:
//!
//! - [`RasterReprojector`]: reprojection into a target reference system and
//!   resampling to a fixed cell size, with bilinear interpolation
//! - [`SlopeComputer`]: per-cell steepness from a 3x3 Sobel gradient
//! - [`Vectorizer`]: 4-connected equal-value regions to attributed
//!   `geo_types` polygons
//!
//! Each stage takes a borrowed [`RasterGrid`](slopemap_dem::RasterGrid) and
//! returns a new value; nothing is modified in place.
//!
//! ## Example
//!
//! ```
//! use slopemap_dem::{GeoTransform, RasterGrid};
//! use slopemap_terrain::{SlopeComputer, SlopeUnits, Vectorizer};
//!
//! let transform = GeoTransform::new(500_000.0, 4_000_000.0, 30.0, -30.0);
//! let dem = RasterGrid::from_fn(4, 4, transform, Some(32633), None, |_, col| col as f64 * 2.0);
//!
//! let slope = SlopeComputer::new(SlopeUnits::Sobel).compute(&dem)?;
//! let features = Vectorizer::default().vectorize(&slope)?;
//! assert_eq!(features.len(), 1);
//! assert_eq!(features.features[0].slope_value(), Some(16.0));
//! # Ok::<(), slopemap_terrain::TerrainError>(())
//! ```

mod error;
mod reproject;
mod slope;
mod vectorize;

pub use error::TerrainError;
pub use reproject::{resample, RasterReprojector, FALLBACK_NODATA, MAX_OUTPUT_CELLS};
pub use slope::{SlopeComputer, SlopeUnits, DEFAULT_SLOPE_NODATA};
pub use vectorize::{
    AttributeValue, VectorFeature, VectorFeatureSet, VectorizeParams, Vectorizer, SLOPE_ATTRIBUTE,
};

/// Result type for terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
