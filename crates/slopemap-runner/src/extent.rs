//! Bounding box of the input footprint.
//!
//! A GeoJSON footprint is a `FeatureCollection`, a single `Feature` or a bare
//! geometry. Its reference system comes from the legacy `crs` member; without
//! one the coordinates are WGS84 (RFC 7946).
//!
//! GeoPackage (`.gpkg`) and Shapefile (`.shp`) footprints are read through
//! GDAL when the `gdal` feature is enabled.

use crate::{PipelineError, Result};
use serde_json::Value;
use slopemap_common::{GeoExtent, EPSG_WGS84};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Extensions handed to OGR instead of the GeoJSON reader.
const OGR_EXTENSIONS: &[&str] = &["gpkg", "shp"];

/// Read the union bounding box of every geometry in the input dataset.
pub fn extract_extent(path: &Path) -> Result<GeoExtent> {
    if !path.is_file() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    if is_ogr_dataset(path) {
        let extent = read_ogr_extent(path)?;
        debug!(?extent, "Read footprint extent");
        return Ok(extent);
    }
    read_geojson_extent(path)
}

fn is_ogr_dataset(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| OGR_EXTENSIONS.iter().any(|o| ext.eq_ignore_ascii_case(o)))
}

#[cfg(feature = "gdal")]
fn read_ogr_extent(path: &Path) -> Result<GeoExtent> {
    crate::gdal_io::read_extent(path)
}

#[cfg(not(feature = "gdal"))]
fn read_ogr_extent(path: &Path) -> Result<GeoExtent> {
    Err(PipelineError::UnsupportedFormat(format!(
        "{}: GeoPackage and Shapefile input needs the `gdal` feature",
        path.display()
    )))
}

fn read_geojson_extent(path: &Path) -> Result<GeoExtent> {
    let text = fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&text)
        .map_err(|e| PipelineError::InvalidInput(format!("{}: {}", path.display(), e)))?;

    let epsg = document_epsg(&document)?;

    let geometries: Vec<&Value> = match document.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => document
            .get("features")
            .and_then(Value::as_array)
            .map(|features| {
                features
                    .iter()
                    .filter_map(|f| f.get("geometry"))
                    .collect()
            })
            .unwrap_or_default(),
        Some("Feature") => document.get("geometry").into_iter().collect(),
        Some(_) => vec![&document],
        None => {
            return Err(PipelineError::InvalidInput(format!(
                "{}: missing GeoJSON type",
                path.display()
            )))
        }
    };

    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for geometry in geometries {
        collect_geometry(geometry, &mut bounds);
    }
    let (min_x, min_y, max_x, max_y) =
        bounds.ok_or_else(|| PipelineError::EmptyDataset(path.to_path_buf()))?;

    debug!(min_x, min_y, max_x, max_y, epsg, "Read footprint extent");
    Ok(GeoExtent::new(min_x, min_y, max_x, max_y, epsg)?)
}

/// EPSG code named by the document's `crs` member.
fn document_epsg(document: &Value) -> Result<u32> {
    let Some(crs) = document.get("crs").filter(|c| !c.is_null()) else {
        return Ok(EPSG_WGS84);
    };
    let name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::UnsupportedCrs(format!("unrecognized crs member {}", crs)))?;
    parse_crs_name(name).ok_or_else(|| PipelineError::UnsupportedCrs(name.to_string()))
}

/// Parse `EPSG:x`, `urn:ogc:def:crs:EPSG::x` (optionally versioned) and the
/// CRS84 names.
pub fn parse_crs_name(name: &str) -> Option<u32> {
    let name = name.trim();
    if name.ends_with("CRS84") {
        return Some(EPSG_WGS84);
    }
    let upper = name.to_ascii_uppercase();
    if upper.starts_with("EPSG:") || upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
        return name.rsplit(':').next().and_then(|code| code.parse().ok());
    }
    None
}

/// Fold every position of a geometry into `bounds`.
fn collect_geometry(geometry: &Value, bounds: &mut Option<(f64, f64, f64, f64)>) {
    if geometry.get("type").and_then(Value::as_str) == Some("GeometryCollection") {
        if let Some(members) = geometry.get("geometries").and_then(Value::as_array) {
            for member in members {
                collect_geometry(member, bounds);
            }
        }
        return;
    }
    if let Some(coordinates) = geometry.get("coordinates") {
        collect_positions(coordinates, bounds);
    }
}

fn collect_positions(value: &Value, bounds: &mut Option<(f64, f64, f64, f64)>) {
    let Some(items) = value.as_array() else {
        return;
    };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => {
            *bounds = Some(match *bounds {
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                }
                None => (x, y, x, y),
            });
        }
        _ => {
            for item in items {
                collect_positions(item, bounds);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_feature_collection_union() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "parcels.geojson",
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {},
                     "geometry": {"type": "Polygon", "coordinates": [[[-97.5, 30.1], [-97.4, 30.1], [-97.4, 30.2], [-97.5, 30.1]]]}},
                    {"type": "Feature", "properties": {},
                     "geometry": {"type": "MultiPolygon", "coordinates": [[[[-97.6, 30.0], [-97.55, 30.0], [-97.55, 30.05], [-97.6, 30.0]]]]}},
                    {"type": "Feature", "properties": {}, "geometry": null}
                ]
            }"#,
        );
        let extent = extract_extent(&path).unwrap();
        assert_eq!(
            (extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()),
            (-97.6, 30.0, -97.4, 30.2)
        );
        assert_eq!(extent.epsg(), 4326);
        assert!(extent.min_x() < extent.max_x() && extent.min_y() < extent.max_y());
    }

    #[test]
    fn test_named_crs_and_geometry_collection() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "site.geojson",
            r#"{
                "type": "Feature",
                "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32614"}},
                "geometry": {"type": "GeometryCollection", "geometries": [
                    {"type": "Point", "coordinates": [620000.0, 3330000.0]},
                    {"type": "LineString", "coordinates": [[620500.0, 3331000.0], [621000.0, 3330500.0]]}
                ]}
            }"#,
        );
        let extent = extract_extent(&path).unwrap();
        assert_eq!(extent.epsg(), 32614);
        assert_eq!(extent.min_x(), 620000.0);
        assert_eq!(extent.max_y(), 3331000.0);
    }

    #[test]
    fn test_parse_crs_name() {
        assert_eq!(parse_crs_name("EPSG:32633"), Some(32633));
        assert_eq!(parse_crs_name("urn:ogc:def:crs:EPSG::3857"), Some(3857));
        assert_eq!(parse_crs_name("urn:ogc:def:crs:EPSG:6.6:4326"), Some(4326));
        assert_eq!(parse_crs_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(4326));
        assert_eq!(parse_crs_name("OGC:CRS84"), Some(4326));
        assert_eq!(parse_crs_name("ESRI:102003"), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = extract_extent(&dir.path().join("nope.geojson")).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }

    #[test]
    fn test_empty_collection() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.geojson", r#"{"type": "FeatureCollection", "features": []}"#);
        assert!(matches!(extract_extent(&path), Err(PipelineError::EmptyDataset(_))));

        let path = write(
            &dir,
            "nulls.geojson",
            r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "geometry": null, "properties": {}}]}"#,
        );
        assert!(matches!(extract_extent(&path), Err(PipelineError::EmptyDataset(_))));
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "point.geojson", r#"{"type": "Point", "coordinates": [10.0, 45.0]}"#);
        assert!(matches!(extract_extent(&path), Err(PipelineError::DegenerateExtent(_))));
    }

    #[test]
    fn test_unknown_crs() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "esri.geojson",
            r#"{"type": "Point", "crs": {"type": "name", "properties": {"name": "ESRI:102003"}}, "coordinates": [1.0, 2.0]}"#,
        );
        assert!(matches!(extract_extent(&path), Err(PipelineError::UnsupportedCrs(_))));
    }

    #[test]
    fn test_ogr_extensions() {
        assert!(is_ogr_dataset(Path::new("parcels.gpkg")));
        assert!(is_ogr_dataset(Path::new("/data/PARCELS.SHP")));
        assert!(!is_ogr_dataset(Path::new("parcels.geojson")));
        assert!(!is_ogr_dataset(Path::new("parcels")));
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn test_geopackage_needs_gdal() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "parcels.gpkg", "SQLite format 3");
        let err = extract_extent(&path).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert!(err.to_string().contains("gdal"));

        // Missing files are still reported as such
        let err = extract_extent(&dir.path().join("absent.shp")).unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }

    #[test]
    fn test_not_json() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.geojson", "{ not json");
        assert!(matches!(extract_extent(&path), Err(PipelineError::InvalidInput(_))));
    }
}
