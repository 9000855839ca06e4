//! Elevation raster download from a remote DEM service.
//!
//! The default service is OpenTopography's global DEM endpoint, which accepts a
//! geographic bounding box and answers with a GeoTIFF body:
//! `https://portal.opentopography.org/API/globaldem?demtype=SRTMGL1&south=..&north=..&west=..&east=..&outputFormat=GTiff&API_Key=..`

use crate::geotiff::read_geotiff;
use crate::grid::RasterGrid;
use crate::{DemError, Result};
use serde::{Deserialize, Serialize};
use slopemap_common::{ArtifactManager, GeoExtent, StageTag};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default global DEM endpoint.
pub const DEFAULT_BASE_URL: &str = "https://portal.opentopography.org/API/globaldem";

/// Default elevation product (SRTM 1 arc-second).
pub const DEFAULT_DEM_TYPE: &str = "SRTMGL1";

/// Default raster format requested from the service.
pub const DEFAULT_OUTPUT_FORMAT: &str = "GTiff";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Longest error body kept in [`DemError::RemoteService`].
const MAX_ERROR_BODY: u64 = 64 * 1024;

/// Settings for the remote elevation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemServiceConfig {
    /// Endpoint URL.
    pub base_url: String,
    /// Elevation product identifier (`demtype`).
    pub dem_type: String,
    /// Output format (`outputFormat`).
    pub output_format: String,
    /// Access credential (`API_Key`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DemServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            dem_type: DEFAULT_DEM_TYPE.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl DemServiceConfig {
    /// Query parameters for a geographic extent.
    pub fn query_for(&self, extent: &GeoExtent) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("demtype", self.dem_type.clone()),
            ("south", extent.min_y().to_string()),
            ("north", extent.max_y().to_string()),
            ("west", extent.min_x().to_string()),
            ("east", extent.max_x().to_string()),
            ("outputFormat", self.output_format.clone()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("API_Key", key.clone()));
        }
        query
    }
}

/// A raw response from the elevation service.
pub struct DemResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, read lazily.
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for DemResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests on behalf of the fetcher.
pub trait DemTransport: Send + Sync {
    /// Send one GET request with the given query parameters.
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<DemResponse>;
}

/// Blocking HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl DemTransport for HttpTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<DemResponse> {
        let response = self.client.get(url).query(query).send()?;
        Ok(DemResponse {
            status: response.status().as_u16(),
            body: Box::new(response),
        })
    }
}

/// A downloaded elevation raster.
#[derive(Debug, Clone)]
pub struct FetchedDem {
    /// Decoded raster.
    pub grid: RasterGrid,
    /// File the body was written to.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes: u64,
}

/// Downloads elevation rasters covering a geographic extent.
pub struct ElevationFetcher {
    config: DemServiceConfig,
    transport: Box<dyn DemTransport>,
}

impl std::fmt::Debug for ElevationFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationFetcher")
            .field("base_url", &self.config.base_url)
            .field("dem_type", &self.config.dem_type)
            .finish()
    }
}

impl ElevationFetcher {
    /// Create a fetcher using the blocking HTTP transport.
    pub fn new(config: DemServiceConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    /// Create a fetcher with a custom transport.
    pub fn with_transport(config: DemServiceConfig, transport: Box<dyn DemTransport>) -> Self {
        Self { config, transport }
    }

    /// Service settings.
    pub fn config(&self) -> &DemServiceConfig {
        &self.config
    }

    /// Download the raster covering `extent` into `dest`.
    ///
    /// Issues exactly one request. On status 200 the body is streamed to
    /// `dest`, which is registered with `artifacts` before it is created.
    /// Any other status yields [`DemError::RemoteService`] and no file.
    pub fn fetch(
        &self,
        extent: &GeoExtent,
        dest: &Path,
        artifacts: &mut ArtifactManager,
    ) -> Result<FetchedDem> {
        if !extent.is_geographic() {
            return Err(DemError::UnsupportedCrs(format!(
                "elevation requests need geographic coordinates, got EPSG:{}",
                extent.epsg()
            )));
        }
        if self.config.api_key.is_none() {
            warn!("No API key configured for the elevation service");
        }

        let query = self.config.query_for(extent);
        info!(
            url = %self.config.base_url,
            dem_type = %self.config.dem_type,
            south = extent.min_y(),
            north = extent.max_y(),
            west = extent.min_x(),
            east = extent.max_x(),
            "Requesting elevation raster"
        );

        let response = self.transport.get(&self.config.base_url, &query)?;
        if response.status != 200 {
            let mut body = String::new();
            let mut limited = response.body.take(MAX_ERROR_BODY);
            if let Err(e) = limited.read_to_string(&mut body) {
                debug!(error = %e, "Could not read error body");
            }
            return Err(DemError::RemoteService {
                status: response.status,
                body: body.trim().to_string(),
            });
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = artifacts.create_file(dest, StageTag::Dem)?;
        let mut writer = BufWriter::new(file);
        let mut body = response.body;
        let bytes = io::copy(&mut body, &mut writer)?;
        writer.flush()?;
        drop(writer);

        info!(path = %dest.display(), bytes, "Downloaded elevation raster");

        let grid = read_geotiff(dest)?;
        debug!(
            width = grid.width(),
            height = grid.height(),
            epsg = ?grid.epsg(),
            "Decoded elevation raster"
        );

        Ok(FetchedDem {
            grid,
            path: dest.to_path_buf(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parameters() {
        let config = DemServiceConfig {
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let extent = GeoExtent::new(-122.5, 47.25, -122.0, 47.75, 4326).unwrap();
        let query = config.query_for(&extent);

        let lookup = |name: &str| {
            query
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(lookup("demtype"), Some("SRTMGL1"));
        assert_eq!(lookup("south"), Some("47.25"));
        assert_eq!(lookup("north"), Some("47.75"));
        assert_eq!(lookup("west"), Some("-122.5"));
        assert_eq!(lookup("east"), Some("-122"));
        assert_eq!(lookup("outputFormat"), Some("GTiff"));
        assert_eq!(lookup("API_Key"), Some("secret"));
    }

    #[test]
    fn test_query_without_key() {
        let config = DemServiceConfig::default();
        let extent = GeoExtent::new(0.0, 0.0, 1.0, 1.0, 4326).unwrap();
        assert!(config.query_for(&extent).iter().all(|(k, _)| *k != "API_Key"));
    }

    #[test]
    fn test_config_defaults_from_partial_yaml_shape() {
        let config: DemServiceConfig =
            serde_json::from_str(r#"{"dem_type": "COP30"}"#).unwrap();
        assert_eq!(config.dem_type, "COP30");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
