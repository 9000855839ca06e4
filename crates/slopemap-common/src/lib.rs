//! # slopemap-common
//!
//! Types shared by every stage of the slope pipeline:
//!
//! - [`GeoExtent`]: the footprint bounding box and its reference system
//! - [`ArtifactManager`]: ownership and cleanup of files written by a run
//! - [`ProgressObserver`] and [`CancelToken`]: progress reporting and
//!   cooperative cancellation, kept free of any presentation concern

mod artifacts;
mod extent;
mod progress;

pub use artifacts::{ArtifactManager, CleanupReport, PipelineArtifact, StageTag};
pub use extent::{ExtentError, GeoExtent, EPSG_WGS84};
pub use progress::{CancelToken, NoopObserver, PipelineStage, ProgressEvent, ProgressObserver};
