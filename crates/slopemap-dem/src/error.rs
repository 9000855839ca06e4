//! Error types for the DEM crate.

use thiserror::Error;

/// Errors that can occur when fetching, reading or writing elevation rasters.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Grid dimensions and band length disagree.
    #[error("Band has {actual} cells but grid is {width}x{height}")]
    DimensionMismatch {
        /// Declared width.
        width: usize,
        /// Declared height.
        height: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The raster has no resolvable reference system, or one we cannot project.
    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    /// HTTP request error when contacting the elevation service.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The elevation service answered with something other than 200.
    #[error("Elevation service returned HTTP {status}: {body}")]
    RemoteService {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// A request parameter is invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
