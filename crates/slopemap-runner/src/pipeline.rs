//! End-to-end slope pipeline.
//!
//! A run goes through the stages in order, each one finishing before the next
//! starts:
//!
//! 1. read the footprint extent from the input dataset
//! 2. download the elevation raster for its geographic bounding box
//! 3. reproject into the working CRS (a UTM zone unless configured)
//! 4. optionally resample to a fixed cell size
//! 5. derive slope
//! 6. vectorize equal-slope regions and write them as GeoJSON or Shapefile
//!
//! Every file written along the way is owned by an [`ArtifactManager`]; only
//! the vector output (and the raw DEM when asked) survives the run, whether it
//! succeeds, fails or is cancelled.

use crate::config::PipelineConfig;
use crate::extent::extract_extent;
use crate::output::{write_geojson, write_shapefile, VectorFormat};
use crate::{PipelineError, Result};
use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use slopemap_common::{
    ArtifactManager, CancelToken, PipelineStage, ProgressEvent, ProgressObserver, StageTag,
};
use slopemap_dem::crs::extent_to_crs;
use slopemap_dem::{write_geotiff_to, Crs, ElevationFetcher, RasterGrid};
use slopemap_terrain::{resample, RasterReprojector, SlopeComputer, Vectorizer};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Timestamp format used in intermediate file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File names for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Downloaded elevation raster.
    pub dem: PathBuf,
    /// Reprojected elevation raster.
    pub reprojected: PathBuf,
    /// Resampled elevation raster.
    pub resampled: PathBuf,
    /// Slope raster.
    pub slope: PathBuf,
    /// Vector output.
    pub vector: PathBuf,
}

impl ArtifactPaths {
    /// Name the files of a run after the input's stem.
    ///
    /// Rasters are `{base}_{suffix}_{timestamp}.tif`; the vector output is
    /// `{base}_slope.{ext}` with the extension of `format`.
    pub fn new(input: &Path, output_dir: &Path, timestamp: &str, format: VectorFormat) -> Self {
        let base = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "footprint".to_string());
        let raster = |stage: StageTag| {
            output_dir.join(format!("{}_{}_{}.tif", base, stage.suffix(), timestamp))
        };
        Self {
            dem: raster(StageTag::Dem),
            reprojected: raster(StageTag::Reprojected),
            resampled: raster(StageTag::Resampled),
            slope: raster(StageTag::Slope),
            vector: output_dir.join(format!(
                "{}_{}.{}",
                base,
                StageTag::Vector.suffix(),
                format.extension()
            )),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Vector output file.
    pub output: PathBuf,
    /// Number of polygons written.
    pub features: usize,
    /// Working reference system.
    pub epsg: u32,
    /// Bytes downloaded from the elevation service.
    pub dem_bytes: u64,
    /// Files left on disk.
    pub retained: Vec<PathBuf>,
}

/// The slope pipeline with its configuration and elevation source.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: ElevationFetcher,
}

impl Pipeline {
    /// Create a pipeline that downloads over HTTP.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = ElevationFetcher::new(config.service.clone())?;
        Ok(Self { config, fetcher })
    }

    /// Create a pipeline with a preconfigured fetcher.
    pub fn with_fetcher(config: PipelineConfig, fetcher: ElevationFetcher) -> Self {
        Self { config, fetcher }
    }

    /// Pipeline settings.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for `input`.
    ///
    /// `observer` receives stage events inline. `cancel` is checked between
    /// stages and inside the slope and vectorization loops.
    pub fn run(
        &self,
        input: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let mut artifacts = ArtifactManager::new();
        let outcome = self.run_stages(input, observer, cancel, &mut artifacts);

        let report = artifacts.cleanup();
        debug!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Cleaned up temporary files"
        );
        if !report.removed.is_empty() {
            observer.on_event(&ProgressEvent::Message(format!(
                "Removed {} temporary file(s)",
                report.removed.len()
            )));
        }

        match &outcome {
            Ok(outcome) => info!(
                output = %outcome.output.display(),
                features = outcome.features,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Slope pipeline finished"
            ),
            Err(e) => warn!(error = %e, "Slope pipeline failed"),
        }
        outcome
    }

    fn run_stages(
        &self,
        input: &Path,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
        artifacts: &mut ArtifactManager,
    ) -> Result<PipelineOutcome> {
        let config = &self.config;

        let extent = stage(PipelineStage::Extent, observer, cancel, || extract_extent(input))?;
        let geographic = if extent.is_geographic() {
            extent
        } else {
            extent_to_crs(&extent, Crs::Wgs84)?
        };

        let target = match config.target_epsg {
            Some(epsg) => Crs::from_epsg(epsg)?,
            None => {
                let (lon, lat) = geographic.center();
                Crs::utm_for(lon, lat)
            }
        };
        info!(input = %input.display(), crs = %target, "Starting slope pipeline");

        let output_dir = match (&config.output_dir, input.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            (None, _) => PathBuf::from("."),
        };
        fs::create_dir_all(&output_dir)?;
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let paths = ArtifactPaths::new(input, &output_dir, &timestamp, config.output_format);

        let dem = stage(PipelineStage::Fetch, observer, cancel, || {
            Ok(self.fetcher.fetch(&geographic, &paths.dem, artifacts)?)
        })?;
        if config.keep_dem {
            artifacts.retain(&dem.path);
        }
        let dem_bytes = dem.bytes;
        observer.on_event(&ProgressEvent::Downloaded { bytes: dem_bytes });

        let mut elevation = stage(PipelineStage::Reproject, observer, cancel, || {
            let grid = RasterReprojector::new(target.epsg()).reproject(&dem.grid)?;
            self.write_intermediate(artifacts, &grid, &paths.reprojected, StageTag::Reprojected)?;
            Ok(grid)
        })?;
        drop(dem);

        if let Some(resolution) = config.resolution {
            elevation = stage(PipelineStage::Resample, observer, cancel, || {
                let grid = resample(&elevation, resolution)?;
                self.write_intermediate(artifacts, &grid, &paths.resampled, StageTag::Resampled)?;
                Ok(grid)
            })?;
        }

        let slope = stage(PipelineStage::Slope, observer, cancel, || {
            let grid = SlopeComputer::new(config.units)
                .with_cancel(cancel.clone())
                .compute(&elevation)?;
            self.write_intermediate(artifacts, &grid, &paths.slope, StageTag::Slope)?;
            Ok(grid)
        })?;
        drop(elevation);

        let features = stage(PipelineStage::Vectorize, observer, cancel, || {
            Ok(Vectorizer::new(config.vectorize)
                .with_cancel(cancel.clone())
                .vectorize(&slope)?)
        })?;

        stage(PipelineStage::Write, observer, cancel, || {
            let files = config.output_format.files(&paths.vector);
            match config.output_format {
                VectorFormat::GeoJson => {
                    let file = artifacts.create_file(&paths.vector, StageTag::Vector)?;
                    write_geojson(&features, BufWriter::new(file))?;
                }
                VectorFormat::Shapefile => {
                    for file in &files {
                        artifacts.register(file.clone(), StageTag::Vector);
                    }
                    write_shapefile(&features, &paths.vector)?;
                }
            }
            for file in files.iter().filter(|f| f.is_file()) {
                artifacts.retain(file);
            }
            Ok(())
        })?;

        Ok(PipelineOutcome {
            output: paths.vector,
            features: features.len(),
            epsg: target.epsg(),
            dem_bytes,
            retained: artifacts.retained_paths(),
        })
    }

    fn write_intermediate(
        &self,
        artifacts: &mut ArtifactManager,
        grid: &RasterGrid,
        path: &Path,
        stage: StageTag,
    ) -> Result<()> {
        if !self.config.write_intermediates {
            return Ok(());
        }
        let file = artifacts.create_file(path, stage)?;
        write_geotiff_to(grid, BufWriter::new(file))?;
        debug!(path = %path.display(), %stage, "Wrote intermediate raster");
        Ok(())
    }
}

/// Run one stage, reporting start and finish and honouring cancellation.
fn stage<T, F>(
    stage: PipelineStage,
    observer: &dyn ProgressObserver,
    cancel: &CancelToken,
    f: F,
) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    observer.on_event(&ProgressEvent::StageStarted(stage));
    info!(%stage, "Stage started");
    let started = Instant::now();

    let value = f()?;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(%stage, elapsed_ms, "Stage finished");
    observer.on_event(&ProgressEvent::StageFinished { stage, elapsed_ms });
    Ok(value)
}

/// Forwards progress events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ProgressEvent>,
}

impl ChannelObserver {
    /// Wrap a sender.
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: &ProgressEvent) {
        // The receiver may have been dropped; the run continues regardless.
        let _ = self.sender.send(event.clone());
    }
}

/// A pipeline running on a background thread.
#[derive(Debug)]
pub struct PipelineTask {
    events: Receiver<ProgressEvent>,
    cancel: CancelToken,
    handle: JoinHandle<Result<PipelineOutcome>>,
}

impl PipelineTask {
    /// Progress events; the channel disconnects when the run ends.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Token that cancels the run.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the run has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<PipelineOutcome> {
        self.handle.join().map_err(|_| PipelineError::Panicked)?
    }
}

/// Start `pipeline` on a new thread.
pub fn spawn_pipeline(pipeline: Pipeline, input: PathBuf) -> Result<PipelineTask> {
    let (sender, events) = crossbeam_channel::unbounded();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let handle = thread::Builder::new()
        .name("slopemap-pipeline".to_string())
        .spawn(move || {
            let observer = ChannelObserver::new(sender);
            pipeline.run(&input, &observer, &token)
        })?;

    Ok(PipelineTask {
        events,
        cancel,
        handle,
    })
}
