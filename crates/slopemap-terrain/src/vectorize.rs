//! Conversion of equal-valued raster regions into polygons.
//!
//! Regions are 4-connected: cells that only touch at a corner belong to
//! different regions. Each region's boundary is traced along cell edges in
//! pixel space, where every cell contributes directed edges for the sides it
//! shares with a cell outside the region. The edges are oriented so the region
//! lies to the right when walking them with rows growing downwards, which
//! makes the outer ring counter-clockwise in pixel space and every hole
//! clockwise.
//!
//! Geometry is built with `geo-types`; rings are re-wound after mapping so
//! exteriors are counter-clockwise and holes clockwise in map coordinates.

use crate::{Result, TerrainError};
use geo::Winding;
use geo_types::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use slopemap_common::CancelToken;
use slopemap_dem::{GeoTransform, RasterGrid};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// Attribute holding the region value.
pub const SLOPE_ATTRIBUTE: &str = "slope_value";

/// A feature attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Number(f64),
    /// Text value.
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Text(_) => None,
        }
    }
}

/// A polygon with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    /// Geometry in the raster's reference system.
    pub geometry: Polygon<f64>,
    /// Named attribute values.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl VectorFeature {
    /// Value of the slope attribute.
    pub fn slope_value(&self) -> Option<f64> {
        self.attributes.get(SLOPE_ATTRIBUTE).and_then(AttributeValue::as_f64)
    }
}

/// Ordered polygon features sharing one reference system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFeatureSet {
    /// EPSG code of the coordinates.
    pub epsg: Option<u32>,
    /// Features in row-major order of each region's first cell.
    pub features: Vec<VectorFeature>,
}

impl VectorFeatureSet {
    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate over features.
    pub fn iter(&self) -> std::slice::Iter<'_, VectorFeature> {
        self.features.iter()
    }
}

/// Region grouping options.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizeParams {
    /// Group values by `round(v / step) * step` instead of exact equality.
    pub quantization: Option<f64>,
    /// Drop regions with fewer cells than this.
    pub min_cells: Option<usize>,
}

/// Converts slope grids into polygon features.
#[derive(Debug, Clone, Default)]
pub struct Vectorizer {
    params: VectorizeParams,
    cancel: Option<CancelToken>,
}

impl Vectorizer {
    /// Create a vectorizer.
    pub fn new(params: VectorizeParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Poll `token` once per region.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Polygonize every region of valid cells.
    pub fn vectorize(&self, grid: &RasterGrid) -> Result<VectorFeatureSet> {
        let (width, height) = grid.dimensions();
        if width == 0 || height == 0 || grid.band().is_empty() {
            return Err(TerrainError::Vectorization(
                "raster has no band data".to_string(),
            ));
        }
        if let Some(step) = self.params.quantization {
            if !(step.is_finite() && step > 0.0) {
                return Err(TerrainError::Vectorization(format!(
                    "quantization step must be positive, got {}",
                    step
                )));
            }
        }

        let values: Vec<Option<f64>> = grid
            .band()
            .iter()
            .map(|&v| (!grid.is_nodata(v)).then(|| self.region_value(v)))
            .collect();

        let mut labels = vec![0u32; width * height];
        let mut next_label = 0u32;
        let mut features = Vec::new();
        let mut skipped = 0usize;

        for start in 0..width * height {
            if labels[start] != 0 {
                continue;
            }
            let Some(value) = values[start] else {
                continue;
            };
            self.check_cancelled()?;

            next_label += 1;
            let cells = flood_fill(&values, &mut labels, width, height, start, value, next_label);

            if self.params.min_cells.is_some_and(|min| cells.len() < min) {
                skipped += 1;
                continue;
            }

            let geometry = trace_region(&cells, &labels, width, height, next_label, grid.transform())?;
            let mut attributes = BTreeMap::new();
            attributes.insert(SLOPE_ATTRIBUTE.to_string(), AttributeValue::Number(value));
            features.push(VectorFeature {
                geometry,
                attributes,
            });
        }

        debug!(
            regions = next_label,
            features = features.len(),
            skipped,
            "Vectorized raster"
        );

        Ok(VectorFeatureSet {
            epsg: grid.epsg(),
            features,
        })
    }

    fn region_value(&self, v: f64) -> f64 {
        let v = match self.params.quantization {
            Some(step) => (v / step).round() * step,
            None => v,
        };
        // Fold -0.0 into 0.0
        v + 0.0
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(TerrainError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Label the 4-connected region holding `start`, returning its cells.
fn flood_fill(
    values: &[Option<f64>],
    labels: &mut [u32],
    width: usize,
    height: usize,
    start: usize,
    value: f64,
    label: u32,
) -> Vec<usize> {
    let same = |idx: usize| values[idx].is_some_and(|v| v.to_bits() == value.to_bits());
    let mut queue = VecDeque::from([start]);
    labels[start] = label;
    let mut cells = Vec::new();

    while let Some(idx) = queue.pop_front() {
        cells.push(idx);
        let (row, col) = (idx / width, idx % width);
        let mut visit = |n: usize| {
            if labels[n] == 0 && same(n) {
                labels[n] = label;
                queue.push_back(n);
            }
        };
        if row > 0 {
            visit(idx - width);
        }
        if row + 1 < height {
            visit(idx + width);
        }
        if col > 0 {
            visit(idx - 1);
        }
        if col + 1 < width {
            visit(idx + 1);
        }
    }
    cells
}

/// Direction of a boundary edge, in clockwise order (rows grow downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    East,
    South,
    West,
    North,
}

impl Dir {
    fn turn_right(self) -> Dir {
        match self {
            Dir::East => Dir::South,
            Dir::South => Dir::West,
            Dir::West => Dir::North,
            Dir::North => Dir::East,
        }
    }

    fn turn_left(self) -> Dir {
        match self {
            Dir::East => Dir::North,
            Dir::South => Dir::East,
            Dir::West => Dir::South,
            Dir::North => Dir::West,
        }
    }
}

type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
    dir: Dir,
}

/// Trace the rings of one labelled region and build its polygon.
///
/// Only the region's own cells are visited, so the cost is proportional to
/// the region size.
fn trace_region(
    cells: &[usize],
    labels: &[u32],
    width: usize,
    height: usize,
    label: u32,
    transform: &GeoTransform,
) -> Result<Polygon<f64>> {
    let inside = |row: isize, col: isize| {
        row >= 0
            && col >= 0
            && (row as usize) < height
            && (col as usize) < width
            && labels[row as usize * width + col as usize] == label
    };

    // Vertices are (col, row) grid corners.
    let mut edges = Vec::new();
    for &idx in cells {
        let (r, c) = (idx / width, idx % width);
        let (ri, ci) = (r as isize, c as isize);
        if !inside(ri - 1, ci) {
            edges.push(Edge { from: (c, r), to: (c + 1, r), dir: Dir::East });
        }
        if !inside(ri, ci + 1) {
            edges.push(Edge { from: (c + 1, r), to: (c + 1, r + 1), dir: Dir::South });
        }
        if !inside(ri + 1, ci) {
            edges.push(Edge { from: (c + 1, r + 1), to: (c, r + 1), dir: Dir::West });
        }
        if !inside(ri, ci - 1) {
            edges.push(Edge { from: (c, r + 1), to: (c, r), dir: Dir::North });
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut exterior = None;
    let mut interiors = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let ring = trace_ring(&edges, &outgoing, &mut used, first)?;
        let ring = drop_collinear(ring);
        let outer = pixel_ring(&ring).is_ccw();

        let mut mapped: LineString<f64> = ring
            .iter()
            .chain(ring.first())
            .map(|&(c, r)| transform.apply(c as f64, r as f64))
            .collect();

        // Exterior counter-clockwise, holes clockwise, whatever the transform.
        if outer {
            mapped.make_ccw_winding();
            if exterior.replace(mapped).is_some() {
                return Err(TerrainError::Vectorization(format!(
                    "region {} has more than one outer ring",
                    label
                )));
            }
        } else {
            mapped.make_cw_winding();
            interiors.push(mapped);
        }
    }

    let exterior = exterior.ok_or_else(|| {
        TerrainError::Vectorization(format!("region {} has no outer ring", label))
    })?;
    Ok(Polygon::new(exterior, interiors))
}

/// Walk edges from `first` until the ring closes.
///
/// At a vertex shared by two rings the walk turns left first, so a hole that
/// touches the outer boundary at a corner is traced as its own ring.
fn trace_ring(
    edges: &[Edge],
    outgoing: &HashMap<Vertex, Vec<usize>>,
    used: &mut [bool],
    first: usize,
) -> Result<Vec<Vertex>> {
    let mut ring = Vec::new();
    let mut current = first;
    used[first] = true;

    loop {
        let edge = edges[current];
        ring.push(edge.from);

        let candidates = outgoing.get(&edge.to).map(Vec::as_slice).unwrap_or(&[]);
        let next = [edge.dir.turn_left(), edge.dir, edge.dir.turn_right()]
            .iter()
            .find_map(|&dir| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| edges[i].dir == dir && (!used[i] || i == first))
            })
            .ok_or_else(|| {
                TerrainError::Vectorization(format!(
                    "boundary does not close at vertex ({}, {})",
                    edge.to.0, edge.to.1
                ))
            })?;

        if next == first {
            return Ok(ring);
        }
        used[next] = true;
        current = next;
    }
}

/// Remove vertices lying on a straight run between their neighbours.
fn drop_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    let step = |a: Vertex, b: Vertex| {
        (
            (b.0 as isize - a.0 as isize).signum(),
            (b.1 as isize - a.1 as isize).signum(),
        )
    };
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            step(prev, ring[i]) != step(ring[i], next)
        })
        .map(|i| ring[i])
        .collect()
}

/// Close a pixel-space ring as a line string.
fn pixel_ring(ring: &[Vertex]) -> LineString<f64> {
    ring.iter()
        .chain(ring.first())
        .map(|&(c, r)| (c as f64, r as f64))
        .collect()
}
