//! # slopemap-dem
//!
//! Elevation rasters for the slope pipeline.
//!
//! This crate provides:
//! - [`RasterGrid`] and [`GeoTransform`]: a single-band grid with affine
//!   georeferencing
//! - GeoTIFF reading and writing (float32, GDAL-compatible georeferencing
//!   and no-data tags)
//! - [`Crs`]: the reference systems the pipeline projects between (WGS84,
//!   Web Mercator and the WGS84 UTM zones)
//! - [`ElevationFetcher`]: a single-request download of the elevation raster
//!   covering a geographic bounding box
//!
//! ## Example
//!
//! ```no_run
//! use slopemap_common::{ArtifactManager, GeoExtent};
//! use slopemap_dem::{DemServiceConfig, ElevationFetcher};
//! use std::path::Path;
//!
//! let config = DemServiceConfig {
//!     api_key: std::env::var("OPENTOPOGRAPHY_API_KEY").ok(),
//!     ..Default::default()
//! };
//! let fetcher = ElevationFetcher::new(config)?;
//! let extent = GeoExtent::new(-122.5, 47.5, -122.4, 47.6, 4326).unwrap();
//!
//! let mut artifacts = ArtifactManager::new();
//! let dem = fetcher.fetch(&extent, Path::new("site_dem.tif"), &mut artifacts)?;
//! println!("{}x{} cells, {} bytes", dem.grid.width(), dem.grid.height(), dem.bytes);
//! # Ok::<(), slopemap_dem::DemError>(())
//! ```

pub mod crs;
mod error;
mod fetch;
mod geotiff;
mod grid;

pub use crs::Crs;
pub use error::DemError;
pub use fetch::{
    DemResponse, DemServiceConfig, DemTransport, ElevationFetcher, FetchedDem, HttpTransport,
    DEFAULT_BASE_URL, DEFAULT_DEM_TYPE, DEFAULT_OUTPUT_FORMAT, DEFAULT_TIMEOUT_SECS,
};
pub use geotiff::{encode_geotiff, read_geotiff, read_geotiff_from, write_geotiff, write_geotiff_to};
pub use grid::{GeoTransform, RasterGrid};

/// Result type for DEM operations.
pub type Result<T> = std::result::Result<T, DemError>;
