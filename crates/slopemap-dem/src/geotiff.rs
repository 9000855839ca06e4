//! Single-band GeoTIFF reading and writing.
//!
//! Georeferencing is carried by the standard GeoTIFF tags:
//! - 33550 ModelPixelScale and 33922 ModelTiepoint (north-up rasters)
//! - 34264 ModelTransformation (rotated rasters)
//! - 34735 GeoKeyDirectory (reference system)
//! - 42113 GDAL_NODATA (no-data value, ASCII)

use crate::grid::{GeoTransform, RasterGrid};
use crate::{DemError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Decoder buffer limit. SRTM requests for large footprints can exceed the
/// tiff crate's defaults.
const DECODE_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

/// Load a GeoTIFF file into a grid.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<RasterGrid> {
    let file = File::open(path.as_ref())?;
    read_geotiff_from(BufReader::new(file))
}

/// Decode a GeoTIFF from any seekable reader.
pub fn read_geotiff_from<R: Read + Seek>(reader: R) -> Result<RasterGrid> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = DECODE_LIMIT_BYTES;
    limits.intermediate_buffer_size = DECODE_LIMIT_BYTES;
    limits.ifd_value_size = DECODE_LIMIT_BYTES;
    let mut decoder = Decoder::new(reader)?.with_limits(limits);

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let geo_keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok();
    let transform = read_transform(&mut decoder, geo_keys.as_deref())?;
    let epsg = geo_keys.as_deref().and_then(read_epsg);
    let nodata = read_nodata_value(&mut decoder);
    let band = decode_band(&mut decoder)?;

    if band.len() != width * height {
        return Err(DemError::InvalidGeoTiff(format!(
            "expected a single band of {}x{} samples, found {}",
            width,
            height,
            band.len()
        )));
    }

    RasterGrid::new(width, height, transform, epsg, nodata, band)
}

/// Build the pixel-to-map transform from the model tags.
fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    geo_keys: Option<&[u16]>,
) -> Result<GeoTransform> {
    let mut transform = if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
        if m.len() < 16 {
            return Err(DemError::InvalidGeoTiff(format!(
                "ModelTransformation has {} values, expected 16",
                m.len()
            )));
        }
        GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]])
    } else {
        let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
        let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));
        match (tiepoint, scale) {
            (Ok(tiepoint), Ok(scale)) if tiepoint.len() >= 6 && scale.len() >= 2 => {
                // Tiepoint format: [i, j, k, x, y, z] ties pixel (i, j) to map (x, y).
                let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
                let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
                GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])
            }
            _ => {
                return Err(DemError::InvalidGeoTiff(
                    "missing ModelTiepoint/ModelPixelScale or ModelTransformation".to_string(),
                ))
            }
        }
    };

    // PixelIsPoint rasters reference pixel centres; shift to corner convention.
    if geo_keys.and_then(|keys| find_geo_key(keys, GT_RASTER_TYPE_GEO_KEY)) == Some(RASTER_PIXEL_IS_POINT) {
        let (x, y) = transform.apply(-0.5, -0.5);
        transform.origin_x = x;
        transform.origin_y = y;
    }

    Ok(transform)
}

/// Look up the EPSG code in a GeoKeyDirectory.
///
/// The projected system wins over the geographic one, matching how GDAL
/// interprets files that carry both.
fn read_epsg(keys: &[u16]) -> Option<u32> {
    [PROJECTED_CS_TYPE_GEO_KEY, GEOGRAPHIC_TYPE_GEO_KEY]
        .iter()
        .filter_map(|&key| find_geo_key(keys, key))
        .find(|&value| value != 0 && value != USER_DEFINED)
        .map(u32::from)
}

/// Read a short-valued key stored inline in the directory.
fn find_geo_key(keys: &[u16], key_id: u16) -> Option<u16> {
    // Header: [version, revision, minor, number_of_keys], then 4 shorts per key.
    let count = *keys.get(3)? as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .find(|entry| entry[0] == key_id && entry[1] == 0)
        .map(|entry| entry[3])
}

/// Decode the first (and only) band to f64.
fn decode_band<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f64>> {
    let result = decoder.read_image()?;
    Ok(match result {
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
    })
}

/// Try to read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse().ok())
}

/// Write a grid to a GeoTIFF file as 32-bit floats.
pub fn write_geotiff<P: AsRef<Path>>(grid: &RasterGrid, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_geotiff_to(grid, BufWriter::new(file))
}

/// Encode a grid into an in-memory GeoTIFF.
pub fn encode_geotiff(grid: &RasterGrid) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_geotiff_to(grid, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Write a grid as a single-band float32 GeoTIFF to any seekable writer.
pub fn write_geotiff_to<W: Write + Seek>(grid: &RasterGrid, writer: W) -> Result<()> {
    let (width, height) = grid.dimensions();
    if width == 0 || height == 0 {
        return Err(DemError::InvalidGeoTiff("raster has zero dimensions".to_string()));
    }

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;

    {
        let dir = image.encoder();
        let transform = grid.transform();
        if transform.is_north_up() {
            let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
            dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])?;
            dir.write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])?;
        } else {
            let matrix = [
                transform.pixel_width,
                transform.row_rotation,
                0.0,
                transform.origin_x,
                transform.col_rotation,
                transform.pixel_height,
                0.0,
                transform.origin_y,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ];
            dir.write_tag(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION), &matrix[..])?;
        }

        let geo_keys = build_geo_key_directory(grid.epsg());
        dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), &geo_keys[..])?;

        if let Some(nodata) = grid.nodata() {
            let text = nodata.to_string();
            dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())?;
        }
    }

    let samples: Vec<f32> = grid.band().iter().map(|&v| v as f32).collect();
    image.write_data(&samples)?;
    Ok(())
}

/// Build the GeoKeyDirectory short array for an EPSG code.
fn build_geo_key_directory(epsg: Option<u32>) -> Vec<u16> {
    let code = epsg.and_then(|c| u16::try_from(c).ok());
    let geographic = code == Some(4326);

    let mut keys = vec![1, 1, 0, 0];
    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    if let Some(code) = code {
        let key = if geographic {
            GEOGRAPHIC_TYPE_GEO_KEY
        } else {
            PROJECTED_CS_TYPE_GEO_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    keys
}
