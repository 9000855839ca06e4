//! Footprints and slope polygons through OGR.
//!
//! Only built with the `gdal` feature. Any vector format GDAL opens can serve
//! as input; output is an ESRI Shapefile set.

use crate::{PipelineError, Result};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    FieldValue, Layer, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType, ToGdal,
};
use gdal::{Dataset, DriverManager};
use slopemap_common::{GeoExtent, EPSG_WGS84};
use slopemap_terrain::{AttributeValue, VectorFeatureSet, SLOPE_ATTRIBUTE};
use std::path::Path;
use tracing::debug;

/// dBase field names stop at 10 characters.
pub const SHAPEFILE_SLOPE_FIELD: &str = "slope_val";

impl From<gdal::errors::GdalError> for PipelineError {
    fn from(err: gdal::errors::GdalError) -> Self {
        PipelineError::VectorIo(err.to_string())
    }
}

/// Union extent of every non-empty layer in an OGR dataset.
///
/// All layers must share one reference system. A layer without one is taken
/// as WGS84.
pub fn read_extent(path: &Path) -> Result<GeoExtent> {
    let dataset = Dataset::open(path)?;

    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    let mut epsg: Option<u32> = None;
    for layer in dataset.layers() {
        if layer.feature_count() == 0 {
            continue;
        }
        let layer_epsg = layer_epsg(&layer)?;
        match epsg {
            Some(seen) if seen != layer_epsg => {
                return Err(PipelineError::InvalidInput(format!(
                    "{}: layers mix EPSG:{} and EPSG:{}",
                    path.display(),
                    seen,
                    layer_epsg
                )))
            }
            _ => epsg = Some(layer_epsg),
        }

        let envelope = layer.get_extent()?;
        debug!(layer = %layer.name(), epsg = layer_epsg, "Read layer envelope");
        bounds = Some(match bounds {
            Some((min_x, min_y, max_x, max_y)) => (
                min_x.min(envelope.MinX),
                min_y.min(envelope.MinY),
                max_x.max(envelope.MaxX),
                max_y.max(envelope.MaxY),
            ),
            None => (envelope.MinX, envelope.MinY, envelope.MaxX, envelope.MaxY),
        });
    }

    let (min_x, min_y, max_x, max_y) =
        bounds.ok_or_else(|| PipelineError::EmptyDataset(path.to_path_buf()))?;
    Ok(GeoExtent::new(min_x, min_y, max_x, max_y, epsg.unwrap_or(EPSG_WGS84))?)
}

fn layer_epsg(layer: &Layer) -> Result<u32> {
    let Some(mut srs) = layer.spatial_ref() else {
        return Ok(EPSG_WGS84);
    };
    if srs.auth_code().is_err() {
        // ESRI .prj files carry no authority until matched.
        srs.auto_identify_epsg()
            .map_err(|e| PipelineError::UnsupportedCrs(e.to_string()))?;
    }
    match (srs.auth_name(), srs.auth_code()) {
        (Ok(name), Ok(code)) if name.eq_ignore_ascii_case("EPSG") && code > 0 => Ok(code as u32),
        _ => Err(PipelineError::UnsupportedCrs(
            srs.to_wkt().unwrap_or_else(|_| "unidentified layer CRS".to_string()),
        )),
    }
}

/// Write polygons as an ESRI Shapefile at `path` (the `.shp` member).
///
/// The slope attribute is stored in [`SHAPEFILE_SLOPE_FIELD`].
pub fn write_shapefile(set: &VectorFeatureSet, path: &Path) -> Result<()> {
    let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
    let mut dataset = driver.create_vector_only(path)?;
    let srs = set.epsg.map(SpatialRef::from_epsg).transpose()?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slope".to_string());

    let mut layer = dataset.create_layer(LayerOptions {
        name: &name,
        srs: srs.as_ref(),
        ty: OGRwkbGeometryType::wkbPolygon,
        options: None,
    })?;
    layer.create_defn_fields(&[(SHAPEFILE_SLOPE_FIELD, OGRFieldType::OFTReal)])?;

    for feature in set.iter() {
        let value = match feature.attributes.get(SLOPE_ATTRIBUTE) {
            Some(AttributeValue::Number(v)) => *v,
            Some(AttributeValue::Integer(v)) => *v as f64,
            Some(AttributeValue::Text(_)) | None => {
                return Err(PipelineError::VectorIo(format!(
                    "feature has no numeric {} attribute",
                    SLOPE_ATTRIBUTE
                )))
            }
        };
        layer.create_feature_fields(
            feature.geometry.to_gdal()?,
            &[SHAPEFILE_SLOPE_FIELD],
            &[FieldValue::RealValue(value)],
        )?;
    }

    debug!(path = %path.display(), features = set.len(), "Wrote shapefile");
    Ok(())
}
