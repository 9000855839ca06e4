//! Terrain slope from a 3x3 Sobel gradient.
//!
//! For each interior cell with neighbourhood
//!
//! ```text
//! a b c
//! d e f
//! g h i
//! ```
//!
//! the column and row gradients are
//!
//! ```text
//! gx = (c + 2f + i) - (a + 2d + g)
//! gy = (g + 2h + i) - (a + 2b + c)
//! ```
//!
//! and the raw slope magnitude is `sqrt(gx² + gy²)`. A plane rising by `Δ` per
//! column has raw magnitude `8Δ`.
//!
//! Boundary cells take the value of the nearest interior cell. No-data cells
//! stay no-data; a no-data neighbour of a valid cell is replaced by the centre
//! value.
//!
//! The output keeps the input's no-data value. Slope is never negative, so a
//! non-negative sentinel (a DEM with `nodata = 0`, say) also marks every cell
//! whose slope equals it: flat ground at `0` reads back as no-data and is
//! dropped by the vectorizer. [`SlopeComputer::compute`] logs a warning when
//! that can happen.

use crate::{Result, TerrainError};
use serde::{Deserialize, Serialize};
use slopemap_common::CancelToken;
use slopemap_dem::{Crs, RasterGrid};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// No-data value for slope grids whose input has none.
pub const DEFAULT_SLOPE_NODATA: f64 = -9999.0;

/// Whether `nodata` lies in the range of slope values.
fn nodata_collides(nodata: Option<f64>) -> bool {
    matches!(nodata, Some(v) if v >= 0.0)
}

/// Units of the slope raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeUnits {
    /// Raw Sobel magnitude, unnormalized.
    #[default]
    Sobel,
    /// Elevation change per horizontal unit.
    RiseRun,
    /// Rise over run as a percentage.
    Percent,
    /// Inclination angle in degrees.
    Degrees,
}

impl SlopeUnits {
    fn convert(self, gx: f64, gy: f64, cell_x: f64, cell_y: f64) -> f64 {
        match self {
            SlopeUnits::Sobel => gx.hypot(gy),
            SlopeUnits::RiseRun => rise_run(gx, gy, cell_x, cell_y),
            SlopeUnits::Percent => 100.0 * rise_run(gx, gy, cell_x, cell_y),
            SlopeUnits::Degrees => rise_run(gx, gy, cell_x, cell_y).atan().to_degrees(),
        }
    }
}

fn rise_run(gx: f64, gy: f64, cell_x: f64, cell_y: f64) -> f64 {
    (gx / (8.0 * cell_x)).hypot(gy / (8.0 * cell_y))
}

impl fmt::Display for SlopeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlopeUnits::Sobel => "sobel",
            SlopeUnits::RiseRun => "rise_run",
            SlopeUnits::Percent => "percent",
            SlopeUnits::Degrees => "degrees",
        };
        f.write_str(name)
    }
}

impl FromStr for SlopeUnits {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sobel" => Ok(SlopeUnits::Sobel),
            "rise_run" | "rise-run" => Ok(SlopeUnits::RiseRun),
            "percent" => Ok(SlopeUnits::Percent),
            "degrees" => Ok(SlopeUnits::Degrees),
            other => Err(format!(
                "unknown slope units '{}', expected sobel, rise_run, percent or degrees",
                other
            )),
        }
    }
}

/// Derives slope grids from elevation grids.
#[derive(Debug, Clone, Default)]
pub struct SlopeComputer {
    units: SlopeUnits,
    cancel: Option<CancelToken>,
}

impl SlopeComputer {
    /// Create a computer producing the given units.
    pub fn new(units: SlopeUnits) -> Self {
        Self {
            units,
            cancel: None,
        }
    }

    /// Poll `token` once per row.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Output units.
    pub fn units(&self) -> SlopeUnits {
        self.units
    }

    /// Compute the slope of `elevation`.
    ///
    /// The result has the same dimensions and georeferencing. Its no-data
    /// value is the input's, or [`DEFAULT_SLOPE_NODATA`] when the input has
    /// none.
    pub fn compute(&self, elevation: &RasterGrid) -> Result<RasterGrid> {
        if let Some(epsg) = elevation.epsg() {
            if Crs::from_epsg(epsg).map(|crs| crs.is_geographic()).unwrap_or(false) {
                return Err(TerrainError::UnsupportedCrs(format!(
                    "slope needs projected coordinates, got EPSG:{}",
                    epsg
                )));
            }
        }

        let (width, height) = elevation.dimensions();
        if width < 3 || height < 3 {
            return Err(TerrainError::GridTooSmall { width, height });
        }

        let (cell_x, cell_y) = elevation.cell_size();
        let band = elevation.band();
        let valid = |idx: usize| !elevation.is_nodata(band[idx]);

        // Interior gradients; `None` marks a no-data centre.
        let mut interior: Vec<Option<f64>> = vec![None; width * height];
        for row in 1..height - 1 {
            self.check_cancelled()?;
            for col in 1..width - 1 {
                let center_idx = row * width + col;
                if !valid(center_idx) {
                    continue;
                }
                let center = band[center_idx];
                let z = |dr: isize, dc: isize| {
                    let idx = (row as isize + dr) as usize * width + (col as isize + dc) as usize;
                    if valid(idx) {
                        band[idx]
                    } else {
                        center
                    }
                };

                let gx = (z(-1, 1) + 2.0 * z(0, 1) + z(1, 1)) - (z(-1, -1) + 2.0 * z(0, -1) + z(1, -1));
                let gy = (z(1, -1) + 2.0 * z(1, 0) + z(1, 1)) - (z(-1, -1) + 2.0 * z(-1, 0) + z(-1, 1));
                interior[center_idx] = Some(self.units.convert(gx, gy, cell_x, cell_y));
            }
        }

        if nodata_collides(elevation.nodata()) {
            warn!(
                nodata = ?elevation.nodata(),
                "Elevation no-data value is a valid slope; matching slope cells will be masked"
            );
        }
        let nodata = elevation.nodata().unwrap_or(DEFAULT_SLOPE_NODATA);
        let mut slope = Vec::with_capacity(width * height);
        for row in 0..height {
            let src_row = row.clamp(1, height - 2);
            for col in 0..width {
                let idx = row * width + col;
                let value = if valid(idx) {
                    let src_col = col.clamp(1, width - 2);
                    interior[src_row * width + src_col].unwrap_or(nodata)
                } else {
                    nodata
                };
                slope.push(value);
            }
        }

        debug!(width, height, units = %self.units, "Computed slope");
        Ok(elevation.with_band(slope, Some(nodata))?)
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(TerrainError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slopemap_dem::GeoTransform;

    fn grid<F: Fn(usize, usize) -> f64>(width: usize, height: usize, nodata: Option<f64>, f: F) -> RasterGrid {
        let transform = GeoTransform::new(500_000.0, 4_000_000.0, 10.0, -10.0);
        RasterGrid::from_fn(width, height, transform, Some(32633), nodata, f)
    }

    #[test]
    fn test_units_from_str() {
        assert_eq!("sobel".parse::<SlopeUnits>().unwrap(), SlopeUnits::Sobel);
        assert_eq!("Rise-Run".parse::<SlopeUnits>().unwrap(), SlopeUnits::RiseRun);
        assert_eq!("degrees".parse::<SlopeUnits>().unwrap(), SlopeUnits::Degrees);
        assert!("radians".parse::<SlopeUnits>().is_err());
        assert_eq!(SlopeUnits::RiseRun.to_string(), "rise_run");
    }

    #[test]
    fn test_ramp_in_other_units() {
        // 5 m per 10 m cell
        let dem = grid(5, 5, None, |_, col| col as f64 * 5.0);

        let rise = SlopeComputer::new(SlopeUnits::RiseRun).compute(&dem).unwrap();
        assert_relative_eq!(rise.get(2, 2).unwrap(), 0.5, epsilon = 1e-12);

        let percent = SlopeComputer::new(SlopeUnits::Percent).compute(&dem).unwrap();
        assert_relative_eq!(percent.get(2, 2).unwrap(), 50.0, epsilon = 1e-9);

        let degrees = SlopeComputer::new(SlopeUnits::Degrees).compute(&dem).unwrap();
        assert_relative_eq!(degrees.get(2, 2).unwrap(), 0.5f64.atan().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_row_ramp() {
        let dem = grid(4, 4, None, |row, _| row as f64 * 3.0);
        let slope = SlopeComputer::default().compute(&dem).unwrap();
        assert!(slope.band().iter().all(|&v| (v - 24.0).abs() < 1e-9));
    }

    #[test]
    fn test_edges_copy_nearest_interior() {
        let dem = grid(5, 4, None, |row, col| (row * row + col * col) as f64);
        let slope = SlopeComputer::default().compute(&dem).unwrap();

        assert_eq!(slope.get(0, 0), slope.get(1, 1));
        assert_eq!(slope.get(0, 2), slope.get(1, 2));
        assert_eq!(slope.get(3, 4), slope.get(2, 3));
        assert_eq!(slope.get(2, 0), slope.get(2, 1));
    }

    #[test]
    fn test_nodata_cells() {
        let dem = grid(5, 5, Some(-32768.0), |row, col| {
            if row == 2 && col == 2 {
                -32768.0
            } else {
                col as f64
            }
        });
        let slope = SlopeComputer::default().compute(&dem).unwrap();

        assert_eq!(slope.nodata(), Some(-32768.0));
        assert!(!slope.is_valid(2, 2));
        // Neighbour (2, 1) sees the centre value in place of the hole:
        // gx = (2 + 2*1 + 2) - (0 + 0 + 0) = 6
        assert_relative_eq!(slope.get(2, 1).unwrap(), 6.0);
        // Corner neighbour replaced: gx = 7, gy = -1
        assert_relative_eq!(slope.get(1, 1).unwrap(), 50f64.sqrt(), epsilon = 1e-12);
        assert_eq!(slope.get(0, 1), slope.get(1, 1));
        assert_eq!(slope.get(4, 1), slope.get(3, 1));
    }

    #[test]
    fn test_boundary_of_nodata_interior_is_nodata() {
        let dem = grid(3, 3, None, |row, col| {
            if row == 1 && col == 1 {
                f64::NAN
            } else {
                1.0
            }
        });
        let slope = SlopeComputer::default().compute(&dem).unwrap();
        assert_eq!(slope.nodata(), Some(DEFAULT_SLOPE_NODATA));
        assert!(slope.band().iter().all(|&v| v == DEFAULT_SLOPE_NODATA));
    }

    #[test]
    fn test_zero_nodata_masks_flat_ground() {
        assert!(nodata_collides(Some(0.0)));
        assert!(nodata_collides(Some(255.0)));
        assert!(!nodata_collides(Some(-32768.0)));
        assert!(!nodata_collides(Some(f64::NAN)));
        assert!(!nodata_collides(None));

        let dem = grid(4, 4, Some(0.0), |_, _| 12.0);
        let slope = SlopeComputer::default().compute(&dem).unwrap();
        assert_eq!(slope.nodata(), Some(0.0));
        assert!(slope.band().iter().all(|&v| v == 0.0));
        assert!((0..4).all(|row| (0..4).all(|col| !slope.is_valid(row, col))));

        // A negative sentinel leaves flat ground valid.
        let dem = grid(4, 4, Some(-32768.0), |_, _| 12.0);
        let slope = SlopeComputer::default().compute(&dem).unwrap();
        assert!(slope.is_valid(1, 1));
        assert_eq!(slope.get(1, 1), Some(0.0));
    }

    #[test]
    fn test_too_small() {
        let dem = grid(2, 5, None, |_, _| 0.0);
        let err = SlopeComputer::default().compute(&dem).unwrap_err();
        assert!(matches!(err, TerrainError::GridTooSmall { width: 2, height: 5 }));
    }

    #[test]
    fn test_geographic_rejected() {
        let transform = GeoTransform::new(13.0, 46.0, 0.001, -0.001);
        let dem = RasterGrid::from_fn(4, 4, transform, Some(4326), None, |_, _| 0.0);
        let err = SlopeComputer::default().compute(&dem).unwrap_err();
        assert!(matches!(err, TerrainError::UnsupportedCrs(_)));
    }

    #[test]
    fn test_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let dem = grid(4, 4, None, |_, _| 0.0);
        let err = SlopeComputer::default()
            .with_cancel(token)
            .compute(&dem)
            .unwrap_err();
        assert!(matches!(err, TerrainError::Cancelled));
    }
}
