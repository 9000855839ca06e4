//! Error types for terrain processing.

use slopemap_dem::DemError;
use thiserror::Error;

/// Errors raised while reprojecting, deriving slope or vectorizing.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Missing, unknown or unsuitable reference system.
    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    /// The 3x3 gradient kernel needs at least three rows and columns.
    #[error("Grid is {width}x{height}, slope needs at least 3x3 cells")]
    GridTooSmall {
        /// Grid width.
        width: usize,
        /// Grid height.
        height: usize,
    },

    /// Target resolution is not a positive finite number.
    #[error("Invalid target resolution: {0}")]
    InvalidResolution(f64),

    /// Polygon extraction failed.
    #[error("Vectorization failed: {0}")]
    Vectorization(String),

    /// The run was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Error from the raster layer.
    #[error(transparent)]
    Dem(#[from] DemError),
}
