//! In-memory raster grid and its affine georeferencing.

use crate::{DemError, Result};
use serde::{Deserialize, Serialize};

/// Affine transformation from pixel indices to map coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row) = (0, 0)` is the top-left corner of the top-left pixel. For
/// north-up rasters the rotations are 0 and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner.
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner.
    pub origin_y: f64,
    /// Cell size along columns.
    pub pixel_width: f64,
    /// Cell size along rows, usually negative.
    pub pixel_height: f64,
    /// Row contribution to x.
    pub row_rotation: f64,
    /// Column contribution to y.
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Build from GDAL ordering
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Coefficients in GDAL ordering.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map fractional pixel coordinates to map coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Map coordinates of a pixel centre.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Inverse mapping to fractional pixel coordinates `(col, row)`.
    ///
    /// Returns `None` for a singular transform.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-15 {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        Some((
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (-self.col_rotation * dx + self.pixel_width * dy) / det,
        ))
    }

    /// Whether the transform has no rotation terms.
    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-12 && self.col_rotation.abs() < 1e-12
    }

    /// Envelope `(min_x, min_y, max_x, max_y)` of a `width` x `height` raster.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(width as f64, 0.0),
            self.apply(0.0, height as f64),
            self.apply(width as f64, height as f64),
        ];
        corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// A single-band raster held in memory.
///
/// Values are stored row-major (north to south, west to east). The band always
/// holds exactly `width * height` values.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    width: usize,
    height: usize,
    transform: GeoTransform,
    epsg: Option<u32>,
    nodata: Option<f64>,
    band: Vec<f64>,
}

impl RasterGrid {
    /// Create a grid, checking that the band matches the dimensions.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        epsg: Option<u32>,
        nodata: Option<f64>,
        band: Vec<f64>,
    ) -> Result<Self> {
        if band.len() != width * height {
            return Err(DemError::DimensionMismatch {
                width,
                height,
                actual: band.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            epsg,
            nodata,
            band,
        })
    }

    /// Create a grid by evaluating `f(row, col)` for every cell.
    pub fn from_fn<F>(
        width: usize,
        height: usize,
        transform: GeoTransform,
        epsg: Option<u32>,
        nodata: Option<f64>,
        f: F,
    ) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut band = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                band.push(f(row, col));
            }
        }
        Self {
            width,
            height,
            transform,
            epsg,
            nodata,
            band,
        }
    }

    /// Create a grid sharing this grid's georeferencing with new values.
    pub fn with_band(&self, band: Vec<f64>, nodata: Option<f64>) -> Result<Self> {
        Self::new(self.width, self.height, self.transform, self.epsg, nodata, band)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pixel-to-map transform.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// EPSG code of the reference system, if known.
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// No-data sentinel, if any.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Row-major cell values.
    pub fn band(&self) -> &[f64] {
        &self.band
    }

    /// Consume the grid and return its values.
    pub fn into_band(self) -> Vec<f64> {
        self.band
    }

    /// Value at `(row, col)`, or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height && col < self.width {
            Some(self.band[row * self.width + col])
        } else {
            None
        }
    }

    /// Whether a value is the no-data sentinel (NaN always counts as no-data).
    pub fn is_nodata(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nodata) if nodata.is_nan() => false,
            Some(nodata) => (value - nodata).abs() <= f64::EPSILON * nodata.abs().max(1.0),
            None => false,
        }
    }

    /// Whether the cell at `(row, col)` holds a measurement.
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some_and(|v| !self.is_nodata(v))
    }

    /// Number of cells that are not no-data.
    pub fn valid_count(&self) -> usize {
        self.band.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Map envelope `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width, self.height)
    }

    /// Absolute cell size `(x, y)` in CRS units.
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.transform.pixel_width.hypot(self.transform.col_rotation),
            self.transform.pixel_height.hypot(self.transform.row_rotation),
        )
    }
}
