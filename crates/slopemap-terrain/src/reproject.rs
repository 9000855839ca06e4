//! Reprojection and resampling of elevation grids.
//!
//! The output grid is the minimum north-up grid covering the projected source
//! footprint. Values are sampled by inverse mapping each output cell centre
//! into the source and interpolating bilinearly between the four surrounding
//! source cell centres.

use crate::{Result, TerrainError};
use slopemap_dem::crs::{transform_bounds, transform_point};
use slopemap_dem::{Crs, GeoTransform, RasterGrid};
use tracing::{debug, warn};

/// No-data value used when the source has none but the output needs one.
pub const FALLBACK_NODATA: f64 = -9999.0;

/// Largest output grid, in cells (2 GiB of `f64` samples).
pub const MAX_OUTPUT_CELLS: usize = 1 << 28;

/// Reprojects grids into a target reference system and resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterReprojector {
    target_epsg: u32,
    resolution: Option<f64>,
}

impl RasterReprojector {
    /// Reproject into `target_epsg`, deriving the resolution from the source.
    pub fn new(target_epsg: u32) -> Self {
        Self {
            target_epsg,
            resolution: None,
        }
    }

    /// Fix the output cell size, in target CRS units.
    pub fn with_resolution(mut self, resolution: Option<f64>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Target EPSG code.
    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Reproject `source`, producing a new grid.
    pub fn reproject(&self, source: &RasterGrid) -> Result<RasterGrid> {
        let src_crs = Crs::from_optional_epsg(source.epsg())
            .map_err(|e| TerrainError::UnsupportedCrs(e.to_string()))?;
        let dst_crs = Crs::from_epsg(self.target_epsg)
            .map_err(|e| TerrainError::UnsupportedCrs(e.to_string()))?;

        if let Some(res) = self.resolution {
            if !(res.is_finite() && res > 0.0) {
                return Err(TerrainError::InvalidResolution(res));
            }
        }

        let (src_w, src_h) = source.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(TerrainError::Dem(slopemap_dem::DemError::InvalidGeoTiff(
                "raster has zero dimensions".to_string(),
            )));
        }

        if src_crs == dst_crs && source.transform().is_north_up() && self.keeps_resolution(source) {
            debug!(epsg = self.target_epsg, "Source already matches target grid");
            return Ok(source.clone());
        }

        let (min_x, min_y, max_x, max_y) = transform_bounds(src_crs, dst_crs, source.bounds());
        let res = match self.resolution {
            Some(res) => res,
            None => {
                // Keep the same number of pixels along the diagonal.
                let dst_diag = (max_x - min_x).hypot(max_y - min_y);
                let src_diag = (src_w as f64).hypot(src_h as f64);
                dst_diag / src_diag
            }
        };
        if !(res.is_finite() && res > 0.0) {
            return Err(TerrainError::InvalidResolution(res));
        }

        let (width, height) = grid_dimensions(max_x - min_x, max_y - min_y, res)?;
        let transform = GeoTransform::new(min_x, max_y, res, -res);

        debug!(
            from = %src_crs,
            to = %dst_crs,
            width,
            height,
            resolution = res,
            "Reprojecting raster"
        );

        let mut samples = Vec::with_capacity(width * height);
        let mut uncovered = false;
        for row in 0..height {
            for col in 0..width {
                let (x, y) = transform.pixel_center(col, row);
                let (sx, sy) = transform_point(dst_crs, src_crs, x, y);
                let sample = source
                    .transform()
                    .invert(sx, sy)
                    .and_then(|(fc, fr)| sample_bilinear(source, fc, fr));
                uncovered |= sample.is_none();
                samples.push(sample);
            }
        }

        let nodata = match source.nodata() {
            Some(nodata) => Some(nodata),
            None if uncovered => Some(FALLBACK_NODATA),
            None => None,
        };
        let fill = nodata.unwrap_or(FALLBACK_NODATA);
        let band = samples.into_iter().map(|s| s.unwrap_or(fill)).collect();

        Ok(RasterGrid::new(
            width,
            height,
            transform,
            Some(dst_crs.epsg()),
            nodata,
            band,
        )?)
    }

    fn keeps_resolution(&self, source: &RasterGrid) -> bool {
        match self.resolution {
            None => true,
            Some(res) => {
                let (cx, cy) = source.cell_size();
                (cx - res).abs() <= 1e-9 * res && (cy - res).abs() <= 1e-9 * res
            }
        }
    }
}

/// Resample a grid to a new cell size without changing its reference system.
pub fn resample(source: &RasterGrid, resolution: f64) -> Result<RasterGrid> {
    let epsg = source.epsg().ok_or_else(|| {
        TerrainError::UnsupportedCrs("raster has no reference system".to_string())
    })?;
    RasterReprojector::new(epsg)
        .with_resolution(Some(resolution))
        .reproject(source)
}

/// Number of cells needed to span `extent` at `res`, at least one.
fn grid_cells(extent: f64, res: f64) -> f64 {
    // Tolerate rounding noise so an exact multiple does not gain a cell.
    (extent / res - 1e-9).ceil().max(1.0)
}

/// Output `(width, height)`, refusing grids above [`MAX_OUTPUT_CELLS`].
fn grid_dimensions(extent_x: f64, extent_y: f64, res: f64) -> Result<(usize, usize)> {
    let width = grid_cells(extent_x, res);
    let height = grid_cells(extent_y, res);
    let cells = width * height;
    if !cells.is_finite() || cells > MAX_OUTPUT_CELLS as f64 {
        warn!(
            resolution = res,
            cells,
            limit = MAX_OUTPUT_CELLS,
            "Output grid would be too large"
        );
        return Err(TerrainError::InvalidResolution(res));
    }
    Ok((width as usize, height as usize))
}

/// Bilinear sample at fractional pixel position `(fc, fr)`.
///
/// Returns `None` outside the grid or on a no-data cell. When the bilinear
/// neighbourhood touches no-data the nearest cell is used instead.
fn sample_bilinear(grid: &RasterGrid, fc: f64, fr: f64) -> Option<f64> {
    let (w, h) = grid.dimensions();
    if !(fc >= 0.0 && fr >= 0.0 && fc < w as f64 && fr < h as f64) {
        return None;
    }

    // Positions relative to cell centres, clamped at the outer half cells.
    let px = (fc - 0.5).clamp(0.0, (w - 1) as f64);
    let py = (fr - 0.5).clamp(0.0, (h - 1) as f64);
    let x0 = px.floor() as usize;
    let y0 = py.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = px - x0 as f64;
    let ty = py - y0 as f64;

    let corners = [
        grid.get(y0, x0)?,
        grid.get(y0, x1)?,
        grid.get(y1, x0)?,
        grid.get(y1, x1)?,
    ];
    if corners.iter().any(|&v| grid.is_nodata(v)) {
        let value = grid.get(fr.floor() as usize, fc.floor() as usize)?;
        return (!grid.is_nodata(value)).then_some(value);
    }

    let top = corners[0] * (1.0 - tx) + corners[1] * tx;
    let bottom = corners[2] * (1.0 - tx) + corners[3] * tx;
    Some(top * (1.0 - ty) + bottom * ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(width: usize, height: usize, cell: f64, delta: f64) -> RasterGrid {
        let transform = GeoTransform::new(500_000.0, 4_000_000.0, cell, -cell);
        RasterGrid::from_fn(width, height, transform, Some(32633), None, |_, col| {
            col as f64 * delta
        })
    }

    #[test]
    fn test_same_crs_is_copy() {
        let grid = ramp(4, 4, 30.0, 2.0);
        let out = RasterReprojector::new(32633).reproject(&grid).unwrap();
        assert_eq!(out, grid);

        let out = resample(&grid, 30.0).unwrap();
        assert_eq!(out, grid);
    }

    #[test]
    fn test_resample_finer_interpolates() {
        let grid = ramp(4, 4, 30.0, 2.0);
        let out = resample(&grid, 15.0).unwrap();

        assert_eq!(out.dimensions(), (8, 8));
        assert_eq!(out.nodata(), None);
        assert_eq!(out.transform(), &GeoTransform::new(500_000.0, 4_000_000.0, 15.0, -15.0));
        // Outer half cells clamp to the edge value
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(out.get(0, 7).unwrap(), 6.0);
        // Interior cells follow the ramp: value = delta * (col - 0.5) / 2
        assert_relative_eq!(out.get(4, 3).unwrap(), 2.5, epsilon = 1e-9);
        assert_relative_eq!(out.get(2, 5).unwrap(), 4.5, epsilon = 1e-9);
    }

    #[test]
    fn test_resample_coarser() {
        let grid = ramp(6, 6, 10.0, 1.0);
        let out = resample(&grid, 20.0).unwrap();
        assert_eq!(out.dimensions(), (3, 3));
        // Output centre (col 1) sits between source cols 2 and 3
        assert_relative_eq!(out.get(1, 1).unwrap(), 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_neighbourhood_uses_nearest() {
        let transform = GeoTransform::new(0.0, 40.0, 10.0, -10.0);
        let grid = RasterGrid::from_fn(4, 4, transform, Some(32633), Some(-1.0), |row, col| {
            if row == 0 && col == 0 {
                -1.0
            } else {
                5.0
            }
        });
        let out = resample(&grid, 5.0).unwrap();
        assert_eq!(out.nodata(), Some(-1.0));
        // Inside the no-data cell
        assert_eq!(out.get(0, 0), Some(-1.0));
        assert_eq!(out.get(1, 1), Some(-1.0));
        // Neighbourhood touches no-data, nearest is valid
        assert_eq!(out.get(1, 2), Some(5.0));
        assert_eq!(out.get(6, 6), Some(5.0));
    }

    #[test]
    fn test_missing_crs() {
        let grid = RasterGrid::from_fn(3, 3, GeoTransform::default(), None, None, |_, _| 0.0);
        let err = RasterReprojector::new(32633).reproject(&grid).unwrap_err();
        assert!(matches!(err, TerrainError::UnsupportedCrs(_)));
        assert!(matches!(resample(&grid, 1.0), Err(TerrainError::UnsupportedCrs(_))));
    }

    #[test]
    fn test_unknown_target() {
        let grid = ramp(3, 3, 30.0, 1.0);
        let err = RasterReprojector::new(2056).reproject(&grid).unwrap_err();
        assert!(matches!(err, TerrainError::UnsupportedCrs(_)));
    }

    #[test]
    fn test_invalid_resolution() {
        let grid = ramp(3, 3, 30.0, 1.0);
        assert!(matches!(
            resample(&grid, 0.0),
            Err(TerrainError::InvalidResolution(_))
        ));
        assert!(matches!(
            resample(&grid, f64::NAN),
            Err(TerrainError::InvalidResolution(_))
        ));
    }

    #[test]
    fn test_grid_cells() {
        assert_eq!(grid_cells(120.0, 30.0), 4.0);
        assert_eq!(grid_cells(121.0, 30.0), 5.0);
        assert_eq!(grid_cells(0.0, 30.0), 1.0);
        assert_eq!(grid_dimensions(120.0, 60.0, 30.0).unwrap(), (4, 2));
    }

    #[test]
    fn test_tiny_resolution_is_refused() {
        let grid = ramp(4, 4, 30.0, 2.0);
        assert!(matches!(
            resample(&grid, 1e-9),
            Err(TerrainError::InvalidResolution(_))
        ));
        assert!(matches!(
            resample(&grid, f64::MIN_POSITIVE),
            Err(TerrainError::InvalidResolution(_))
        ));
        let side = (MAX_OUTPUT_CELLS as f64).sqrt();
        assert!(grid_dimensions(side, side, 1.0).is_ok());
        assert!(grid_dimensions(side * 2.0, side, 1.0).is_err());
    }
}
