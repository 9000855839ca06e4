//! # slopemap-runner
//!
//! Orchestration of the slope pipeline and the `slopemap` command-line tool.
//!
//! Given a vector footprint, [`Pipeline::run`] downloads the elevation
//! raster covering it, reprojects it into a metric reference system, derives
//! slope and writes the equal-slope regions as polygons next to the input.
//! Intermediate rasters are deleted when the run ends, however it ends.
//!
//! Footprints and output are GeoJSON by default. The `gdal` feature adds
//! GeoPackage and Shapefile footprints and Shapefile output.
//!
//! ```no_run
//! use slopemap_common::{CancelToken, NoopObserver};
//! use slopemap_runner::{Pipeline, PipelineConfig};
//! use std::path::Path;
//!
//! let mut config = PipelineConfig::default();
//! config.service.api_key = std::env::var("OPENTOPOGRAPHY_API_KEY").ok();
//!
//! let pipeline = Pipeline::new(config)?;
//! let outcome = pipeline.run(Path::new("parcel.geojson"), &NoopObserver, &CancelToken::new())?;
//! println!("{} polygons in {}", outcome.features, outcome.output.display());
//! # Ok::<(), slopemap_runner::PipelineError>(())
//! ```

pub mod config;
mod error;
pub mod extent;
#[cfg(feature = "gdal")]
pub mod gdal_io;
pub mod output;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extent::extract_extent;
pub use output::VectorFormat;
pub use pipeline::{
    spawn_pipeline, ArtifactPaths, ChannelObserver, Pipeline, PipelineOutcome, PipelineTask,
};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
