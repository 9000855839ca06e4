//! `slopemap`: derive slope polygons for a vector footprint.

use clap::Parser;
use slopemap_common::ProgressEvent;
use slopemap_runner::{spawn_pipeline, Pipeline, PipelineConfig, PipelineError, VectorFormat};
use slopemap_terrain::SlopeUnits;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "slopemap", version)]
#[command(about = "Download elevation for a footprint and vectorize its slope")]
struct Args {
    /// Input footprint (GeoJSON; GeoPackage or Shapefile with the gdal feature)
    input: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OpenTopography API key
    #[arg(long, env = "OPENTOPOGRAPHY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Working CRS as an EPSG code (default: UTM zone of the footprint)
    #[arg(long)]
    target_epsg: Option<u32>,

    /// Resample to this cell size before computing slope
    #[arg(long)]
    resolution: Option<f64>,

    /// Group slope values into bins of this width
    #[arg(long)]
    quantize: Option<f64>,

    /// Slope units: sobel, rise_run, percent or degrees
    #[arg(long)]
    units: Option<SlopeUnits>,

    /// Drop polygons covering fewer cells
    #[arg(long)]
    min_cells: Option<usize>,

    /// Output format: geojson or shapefile
    #[arg(long)]
    format: Option<VectorFormat>,

    /// Output directory (default: next to the input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Keep the downloaded elevation raster
    #[arg(long)]
    keep_dem: bool,

    /// Do not write intermediate rasters
    #[arg(long)]
    no_intermediates: bool,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(key) = &args.api_key {
        config.service.api_key = Some(key.clone());
    }
    if args.target_epsg.is_some() {
        config.target_epsg = args.target_epsg;
    }
    if args.resolution.is_some() {
        config.resolution = args.resolution;
    }
    if args.quantize.is_some() {
        config.vectorize.quantization = args.quantize;
    }
    if let Some(units) = args.units {
        config.units = units;
    }
    if args.min_cells.is_some() {
        config.vectorize.min_cells = args.min_cells;
    }
    if let Some(format) = args.format {
        config.output_format = format;
    }
    if args.output_dir.is_some() {
        config.output_dir = args.output_dir.clone();
    }
    if args.keep_dem {
        config.keep_dem = true;
    }
    if args.no_intermediates {
        config.write_intermediates = false;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), PipelineError> {
    let Some(input) = args.input.clone() else {
        return Err(PipelineError::Config(
            "no input footprint given (usage: slopemap <INPUT>)".to_string(),
        ));
    };

    let config = build_config(&args)?;
    if config.service.api_key.is_none() {
        warn!("OPENTOPOGRAPHY_API_KEY is not set; the elevation service will likely refuse the request");
    }

    let pipeline = Pipeline::new(config)?;
    let task = spawn_pipeline(pipeline, input)?;

    let token = task.cancel_token().clone();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!(error = %e, "Could not install Ctrl-C handler");
    }

    for event in task.events().iter() {
        match event {
            ProgressEvent::Downloaded { bytes } => {
                info!(bytes, "Elevation raster downloaded")
            }
            ProgressEvent::Message(message) => info!("{}", message),
            ProgressEvent::StageStarted(_) | ProgressEvent::StageFinished { .. } => {}
        }
    }

    let outcome = task.join()?;
    println!("Successfully created: {}", outcome.output.display());
    for path in outcome.retained.iter().filter(|p| **p != outcome.output) {
        println!("Kept: {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "slopemap failed");
            ExitCode::FAILURE
        }
    }
}
