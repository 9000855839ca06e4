//! Vector output of the slope polygons.
//!
//! GeoJSON is always available. Shapefile output goes through GDAL and needs
//! the `gdal` feature.

use crate::Result;
use geo_types::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use slopemap_terrain::VectorFeatureSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File format of the vector output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorFormat {
    /// GeoJSON `FeatureCollection` with a legacy `crs` member.
    #[default]
    GeoJson,
    /// ESRI Shapefile set (`.shp`, `.shx`, `.dbf`, `.prj`, `.cpg`).
    Shapefile,
}

impl VectorFormat {
    /// Extension of the main output file.
    pub fn extension(&self) -> &'static str {
        match self {
            VectorFormat::GeoJson => "geojson",
            VectorFormat::Shapefile => "shp",
        }
    }

    /// Whether this build can write the format.
    pub fn is_available(&self) -> bool {
        match self {
            VectorFormat::GeoJson => true,
            VectorFormat::Shapefile => cfg!(feature = "gdal"),
        }
    }

    /// Every file the format writes for the main output `path`.
    pub fn files(&self, path: &Path) -> Vec<PathBuf> {
        match self {
            VectorFormat::GeoJson => vec![path.to_path_buf()],
            VectorFormat::Shapefile => ["shp", "shx", "dbf", "prj", "cpg"]
                .iter()
                .map(|ext| path.with_extension(ext))
                .collect(),
        }
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VectorFormat::GeoJson => "geojson",
            VectorFormat::Shapefile => "shapefile",
        };
        f.write_str(name)
    }
}

impl FromStr for VectorFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(VectorFormat::GeoJson),
            "shapefile" | "shp" => Ok(VectorFormat::Shapefile),
            other => Err(format!(
                "unknown vector format '{}', expected geojson or shapefile",
                other
            )),
        }
    }
}

/// Build a GeoJSON `FeatureCollection`.
///
/// Coordinates stay in the raster's reference system, which is named in a
/// legacy `crs` member so GIS tools place them correctly.
pub fn feature_collection(set: &VectorFeatureSet) -> Value {
    let features: Vec<Value> = set
        .iter()
        .map(|feature| {
            let properties: Map<String, Value> = feature
                .attributes
                .iter()
                .map(|(name, value)| {
                    (
                        name.clone(),
                        serde_json::to_value(value).unwrap_or(Value::Null),
                    )
                })
                .collect();
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": polygon_geometry(&feature.geometry),
            })
        })
        .collect();

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(epsg) = set.epsg {
        collection["crs"] = json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", epsg) },
        });
    }
    collection
}

fn polygon_geometry(polygon: &Polygon<f64>) -> Value {
    let ring = |line: &LineString<f64>| -> Value {
        line.coords().map(|c| json!([c.x, c.y])).collect()
    };
    let mut rings = vec![ring(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring));
    json!({
        "type": "Polygon",
        "coordinates": rings,
    })
}

/// Write the features as pretty-printed GeoJSON.
pub fn write_geojson<W: Write>(set: &VectorFeatureSet, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, &feature_collection(set))
        .map_err(std::io::Error::from)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write the features as an ESRI Shapefile at `path`.
#[cfg(feature = "gdal")]
pub fn write_shapefile(set: &VectorFeatureSet, path: &Path) -> Result<()> {
    crate::gdal_io::write_shapefile(set, path)
}

/// Write the features as an ESRI Shapefile at `path`.
#[cfg(not(feature = "gdal"))]
pub fn write_shapefile(_set: &VectorFeatureSet, path: &Path) -> Result<()> {
    Err(crate::PipelineError::UnsupportedFormat(format!(
        "{}: shapefile output needs the `gdal` feature",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use slopemap_terrain::{AttributeValue, VectorFeature, SLOPE_ATTRIBUTE};
    use std::collections::BTreeMap;

    fn square(value: f64) -> VectorFeature {
        let mut attributes = BTreeMap::new();
        attributes.insert(SLOPE_ATTRIBUTE.to_string(), AttributeValue::Number(value));
        VectorFeature {
            geometry: Polygon::new(
                LineString::from(vec![(0.0, 0.0), (30.0, 0.0), (30.0, 30.0), (0.0, 30.0), (0.0, 0.0)]),
                vec![LineString::from(vec![
                    (10.0, 10.0),
                    (10.0, 20.0),
                    (20.0, 20.0),
                    (20.0, 10.0),
                    (10.0, 10.0),
                ])],
            ),
            attributes,
        }
    }

    #[test]
    fn test_feature_collection_shape() {
        let set = VectorFeatureSet {
            epsg: Some(32614),
            features: vec![square(12.5)],
        };
        let value = feature_collection(&set);

        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::32614");
        let feature = &value["features"][0];
        assert_eq!(feature["properties"]["slope_value"], 12.5);
        assert_eq!(feature["geometry"]["type"], "Polygon");
        let rings = feature["geometry"]["coordinates"].as_array().unwrap();
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0][1], json!([30.0, 0.0]));
    }

    #[test]
    fn test_no_crs_member_without_epsg() {
        let value = feature_collection(&VectorFeatureSet::default());
        assert!(value.get("crs").is_none());
        assert_eq!(value["features"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_vector_format_names() {
        assert_eq!("GeoJSON".parse::<VectorFormat>().unwrap(), VectorFormat::GeoJson);
        assert_eq!("shp".parse::<VectorFormat>().unwrap(), VectorFormat::Shapefile);
        assert!("gpkg".parse::<VectorFormat>().is_err());
        assert_eq!(VectorFormat::Shapefile.to_string(), "shapefile");
        assert_eq!(VectorFormat::default().extension(), "geojson");
        assert!(VectorFormat::GeoJson.is_available());
    }

    #[test]
    fn test_shapefile_members() {
        let files = VectorFormat::Shapefile.files(Path::new("/out/site_slope.shp"));
        assert_eq!(files.len(), 5);
        assert_eq!(files[0], Path::new("/out/site_slope.shp"));
        assert!(files.contains(&PathBuf::from("/out/site_slope.dbf")));
        assert_eq!(
            VectorFormat::GeoJson.files(Path::new("a.geojson")),
            vec![PathBuf::from("a.geojson")]
        );
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn test_shapefile_needs_gdal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.shp");
        let err = write_shapefile(&VectorFeatureSet::default(), &path).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        assert!(!path.exists());
        assert!(!VectorFormat::Shapefile.is_available());
    }

    #[test]
    fn test_write_geojson() {
        let set = VectorFeatureSet {
            epsg: Some(32614),
            features: vec![square(1.0), square(2.0)],
        };
        let mut buffer = Vec::new();
        write_geojson(&set, &mut buffer).unwrap();
        let parsed: Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["features"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["features"][1]["properties"]["slope_value"], 2.0);
    }
}
