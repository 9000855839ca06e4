//! Pipeline error type.

use slopemap_common::ExtentError;
use slopemap_dem::DemError;
use slopemap_terrain::TerrainError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Input dataset has no features with coordinates: {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("Invalid input dataset: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    DegenerateExtent(String),

    #[error("Elevation service returned HTTP {status}: {body}")]
    RemoteService { status: u16, body: String },

    #[error("Elevation download failed: {0}")]
    Download(String),

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("Raster I/O error: {0}")]
    RasterIo(String),

    #[error("Grid is {width}x{height}, slope needs at least 3x3 cells")]
    GridTooSmall { width: usize, height: usize },

    #[error("Vectorization failed: {0}")]
    Vectorization(String),

    #[error("Unsupported vector format: {0}")]
    UnsupportedFormat(String),

    #[error("Vector I/O error: {0}")]
    VectorIo(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Pipeline thread panicked")]
    Panicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DemError> for PipelineError {
    fn from(err: DemError) -> Self {
        match err {
            DemError::RemoteService { status, body } => PipelineError::RemoteService { status, body },
            DemError::UnsupportedCrs(msg) => PipelineError::UnsupportedCrs(msg),
            DemError::HttpRequest(e) => PipelineError::Download(e.to_string()),
            DemError::InvalidRequest(msg) => PipelineError::DegenerateExtent(msg),
            other @ (DemError::Io(_)
            | DemError::Tiff(_)
            | DemError::InvalidGeoTiff(_)
            | DemError::DimensionMismatch { .. }) => PipelineError::RasterIo(other.to_string()),
        }
    }
}

impl From<TerrainError> for PipelineError {
    fn from(err: TerrainError) -> Self {
        match err {
            TerrainError::UnsupportedCrs(msg) => PipelineError::UnsupportedCrs(msg),
            TerrainError::GridTooSmall { width, height } => {
                PipelineError::GridTooSmall { width, height }
            }
            TerrainError::InvalidResolution(res) => {
                PipelineError::Config(format!("invalid resolution {}", res))
            }
            TerrainError::Vectorization(msg) => PipelineError::Vectorization(msg),
            TerrainError::Cancelled => PipelineError::Cancelled,
            TerrainError::Dem(e) => e.into(),
        }
    }
}

impl From<ExtentError> for PipelineError {
    fn from(err: ExtentError) -> Self {
        PipelineError::DegenerateExtent(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_service_keeps_status() {
        let err: PipelineError = DemError::RemoteService {
            status: 503,
            body: "busy".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::RemoteService { status: 503, .. }));
        assert_eq!(err.to_string(), "Elevation service returned HTTP 503: busy");
    }

    #[test]
    fn test_nested_dem_error() {
        let err: PipelineError = TerrainError::Dem(DemError::InvalidGeoTiff("no tags".into())).into();
        assert!(matches!(err, PipelineError::RasterIo(_)));
    }

    #[test]
    fn test_terrain_errors() {
        let err: PipelineError = TerrainError::GridTooSmall { width: 2, height: 2 }.into();
        assert!(matches!(err, PipelineError::GridTooSmall { width: 2, height: 2 }));
        let err: PipelineError = TerrainError::Cancelled.into();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
