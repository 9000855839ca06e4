//! Pipeline configuration.
//!
//! Loaded from YAML; every field has a default so a partial file (or none at
//! all) is valid:
//!
//! ```yaml
//! service:
//!   dem_type: SRTMGL1
//!   timeout_secs: 120
//! target_epsg: 32614
//! resolution: 10.0
//! units: degrees
//! vectorize:
//!   quantization: 1.0
//!   min_cells: 4
//! keep_dem: false
//! write_intermediates: true
//! output_format: geojson
//! ```
//!
//! The API key is normally supplied through `OPENTOPOGRAPHY_API_KEY` rather
//! than the file.

use crate::output::VectorFormat;
use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use slopemap_dem::DemServiceConfig;
use slopemap_terrain::{SlopeUnits, VectorizeParams};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Remote elevation service.
    pub service: DemServiceConfig,
    /// Working reference system; the UTM zone of the footprint when unset.
    pub target_epsg: Option<u32>,
    /// Cell size of the optional resampling pass, in target CRS units.
    pub resolution: Option<f64>,
    /// Units of the slope raster.
    pub units: SlopeUnits,
    /// Region grouping.
    pub vectorize: VectorizeParams,
    /// Where outputs go; the input's directory when unset.
    pub output_dir: Option<PathBuf>,
    /// Keep the downloaded elevation raster after the run.
    pub keep_dem: bool,
    /// Write reprojected, resampled and slope rasters to disk.
    pub write_intermediates: bool,
    /// Format of the vector output.
    pub output_format: VectorFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service: DemServiceConfig::default(),
            target_epsg: None,
            resolution: None,
            units: SlopeUnits::default(),
            vectorize: VectorizeParams::default(),
            output_dir: None,
            keep_dem: false,
            write_intermediates: true,
            output_format: VectorFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(res) = self.resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(PipelineError::Config(format!(
                    "resolution must be positive, got {}",
                    res
                )));
            }
        }
        if let Some(step) = self.vectorize.quantization {
            if !(step.is_finite() && step > 0.0) {
                return Err(PipelineError::Config(format!(
                    "quantization must be positive, got {}",
                    step
                )));
            }
        }
        if self.service.base_url.trim().is_empty() {
            return Err(PipelineError::Config("service.base_url is empty".to_string()));
        }
        if !self.output_format.is_available() {
            return Err(PipelineError::Config(format!(
                "{} output needs the `gdal` feature",
                self.output_format
            )));
        }
        if self.service.timeout_secs == 0 {
            return Err(PipelineError::Config("service.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = PipelineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.write_intermediates);
        assert_eq!(config.service.dem_type, "SRTMGL1");
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
service:
  dem_type: COP30
target_epsg: 32614
resolution: 10.0
units: degrees
vectorize:
  quantization: 0.5
keep_dem: true
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.service.dem_type, "COP30");
        assert_eq!(config.service.output_format, "GTiff");
        assert_eq!(config.target_epsg, Some(32614));
        assert_eq!(config.resolution, Some(10.0));
        assert_eq!(config.units, SlopeUnits::Degrees);
        assert_eq!(config.vectorize.quantization, Some(0.5));
        assert_eq!(config.vectorize.min_cells, None);
        assert!(config.keep_dem);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("resolution: -5.0"),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_yaml_str("vectorize:\n  quantization: 0.0"),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_yaml_str("units: radians"),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_output_format() {
        let config = PipelineConfig::from_yaml_str("output_format: geojson").unwrap();
        assert_eq!(config.output_format, VectorFormat::GeoJson);

        let shapefile = PipelineConfig::from_yaml_str("output_format: shapefile");
        if cfg!(feature = "gdal") {
            assert_eq!(shapefile.unwrap().output_format, VectorFormat::Shapefile);
        } else {
            assert!(matches!(shapefile, Err(PipelineError::Config(_))));
        }
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_yaml_file("/nonexistent/slopemap.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
