//! Progress reporting and cooperative cancellation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Processing step of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the input footprint.
    Extent,
    /// Downloading the elevation raster.
    Fetch,
    /// Reprojecting to the working CRS.
    Reproject,
    /// Resampling to the requested resolution.
    Resample,
    /// Computing slope.
    Slope,
    /// Converting slope regions to polygons.
    Vectorize,
    /// Writing the vector output.
    Write,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Extent => "extent",
            PipelineStage::Fetch => "fetch",
            PipelineStage::Reproject => "reproject",
            PipelineStage::Resample => "resample",
            PipelineStage::Slope => "slope",
            PipelineStage::Vectorize => "vectorize",
            PipelineStage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Event emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A stage is about to start.
    StageStarted(PipelineStage),
    /// A stage completed.
    StageFinished {
        /// Stage that completed.
        stage: PipelineStage,
        /// Wall time spent in the stage.
        elapsed_ms: u64,
    },
    /// The elevation download finished.
    Downloaded {
        /// Bytes written to disk.
        bytes: u64,
    },
    /// Free-form status line.
    Message(String),
}

/// Receives progress events.
///
/// Implementations must not block for long; the pipeline calls them inline.
pub trait ProgressObserver {
    /// Handle one event.
    fn on_event(&self, event: &ProgressEvent);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent),
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Shared flag used to request cancellation.
///
/// Clones share the same flag. Long-running loops poll
/// [`CancelToken::is_cancelled`]; nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
