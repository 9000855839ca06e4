//! Coordinate reference systems and the projection math needed to move
//! between them.
//!
//! Only the systems the pipeline works with are supported:
//! - EPSG:4326: WGS84 longitude/latitude
//! - EPSG:3857: Web Mercator
//! - EPSG:326xx / 327xx: WGS84 UTM, north and south hemispheres
//!
//! UTM uses the Transverse Mercator series from Snyder (1987), USGS
//! Professional Paper 1395, pp. 61-64, accurate to well under a metre inside
//! a zone.

use crate::{DemError, Result};
use slopemap_common::GeoExtent;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);

// UTM
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Web Mercator latitude limit (arctan(sinh(π))).
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

/// Number of points sampled along each edge when projecting a box.
pub const DENSIFY_POINTS: usize = 21;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS84 geographic (EPSG:4326), coordinates are (lon, lat) in degrees.
    Wgs84,
    /// Web Mercator (EPSG:3857), metres.
    WebMercator,
    /// WGS84 UTM zone, metres.
    Utm {
        /// Zone number, 1-60.
        zone: u8,
        /// Northern hemisphere if true.
        north: bool,
    },
}

impl Crs {
    /// Resolve an EPSG code.
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        match epsg {
            4326 => Ok(Crs::Wgs84),
            3857 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm {
                zone: (epsg - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (epsg - 32700) as u8,
                north: false,
            }),
            _ => Err(DemError::UnsupportedCrs(format!("EPSG:{}", epsg))),
        }
    }

    /// Resolve an optional EPSG code, failing when it is absent.
    pub fn from_optional_epsg(epsg: Option<u32>) -> Result<Self> {
        match epsg {
            Some(code) => Self::from_epsg(code),
            None => Err(DemError::UnsupportedCrs(
                "raster has no reference system".to_string(),
            )),
        }
    }

    /// The UTM zone containing a WGS84 point.
    pub fn utm_for(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        Crs::Utm {
            zone,
            north: lat >= 0.0,
        }
    }

    /// EPSG code of this system.
    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + zone as u32,
            Crs::Utm { zone, north: false } => 32700 + zone as u32,
        }
    }

    /// Whether coordinates are angular (degrees).
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// Convert a coordinate in this system to WGS84 (lon, lat).
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - FRAC_PI_2).to_degrees();
                (lon, lat)
            }
            Crs::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }

    /// Convert a WGS84 (lon, lat) coordinate into this system.
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Crs::Wgs84 => (lon, lat),
            Crs::WebMercator => {
                let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
                (A * lon.to_radians(), A * (FRAC_PI_4 + lat / 2.0).tan().ln())
            }
            Crs::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Transform a single point between two systems.
pub fn transform_point(from: Crs, to: Crs, x: f64, y: f64) -> (f64, f64) {
    if from == to {
        return (x, y);
    }
    let (lon, lat) = from.to_wgs84(x, y);
    to.from_wgs84(lon, lat)
}

/// Project a box into another system and return the envelope of the result.
///
/// Each edge is sampled at [`DENSIFY_POINTS`] positions so curved edges in the
/// target system are still enclosed. Returns `(min_x, min_y, max_x, max_y)`.
pub fn transform_bounds(
    from: Crs,
    to: Crs,
    bounds: (f64, f64, f64, f64),
) -> (f64, f64, f64, f64) {
    let (min_x, min_y, max_x, max_y) = bounds;
    if from == to {
        return bounds;
    }

    let mut out = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    let steps = DENSIFY_POINTS - 1;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = min_x + t * (max_x - min_x);
        let y = min_y + t * (max_y - min_y);
        for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
            let (tx, ty) = transform_point(from, to, px, py);
            out.0 = out.0.min(tx);
            out.1 = out.1.min(ty);
            out.2 = out.2.max(tx);
            out.3 = out.3.max(ty);
        }
    }
    out
}

/// Re-express an extent in another reference system.
pub fn extent_to_crs(extent: &GeoExtent, target: Crs) -> Result<GeoExtent> {
    let source = Crs::from_epsg(extent.epsg())?;
    let (min_x, min_y, max_x, max_y) = transform_bounds(
        source,
        target,
        (extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()),
    );
    GeoExtent::new(min_x, min_y, max_x, max_y, target.epsg())
        .map_err(|e| DemError::InvalidRequest(e.to_string()))
}

/// Convert WGS84 (lon, lat) in degrees to UTM (easting, northing) in metres.
fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u8, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a2 * a2;
    let a5 = a4 * a;
    let a6 = a4 * a2;

    // Snyder 8-9 and 8-10
    let easting = K0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a5 / 120.0)
        + FALSE_EASTING;
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

/// Convert UTM (easting, northing) in metres to WGS84 (lon, lat) in degrees.
fn utm_to_wgs84(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1me2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude, Snyder 3-26
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d2 * d2;
    let d5 = d4 * d;
    let d6 = d4 * d2;

    // Snyder 8-17 and 8-18
    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);
    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Central meridian of a UTM zone, in radians.
fn central_meridian(zone: u8) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

/// Meridional arc from the equator to `lat` (radians), Snyder 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;
    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_from_epsg() {
        assert_eq!(Crs::from_epsg(4326).unwrap(), Crs::Wgs84);
        assert_eq!(Crs::from_epsg(3857).unwrap(), Crs::WebMercator);
        assert_eq!(
            Crs::from_epsg(32610).unwrap(),
            Crs::Utm {
                zone: 10,
                north: true
            }
        );
        assert_eq!(
            Crs::from_epsg(32755).unwrap(),
            Crs::Utm {
                zone: 55,
                north: false
            }
        );
        assert!(Crs::from_epsg(32600).is_err());
        assert!(Crs::from_epsg(2193).is_err());
        assert!(Crs::from_optional_epsg(None).is_err());
    }

    #[test]
    fn test_epsg_roundtrip() {
        for code in [4326, 3857, 32601, 32633, 32660, 32701, 32760] {
            assert_eq!(Crs::from_epsg(code).unwrap().epsg(), code);
        }
    }

    #[test]
    fn test_utm_for() {
        // Seattle is in zone 10N.
        assert_eq!(
            Crs::utm_for(-122.3321, 47.6062),
            Crs::Utm {
                zone: 10,
                north: true
            }
        );
        // Sydney is in zone 56S.
        assert_eq!(
            Crs::utm_for(151.2093, -33.8688),
            Crs::Utm {
                zone: 56,
                north: false
            }
        );
        // The antimeridian clamps to zone 60.
        assert_eq!(Crs::utm_for(180.0, 10.0).epsg(), 32660);
    }

    #[test]
    fn test_utm_central_meridian_equator() {
        // The central meridian at the equator maps exactly to the false easting.
        let crs = Crs::from_epsg(32631).unwrap();
        let (e, n) = crs.from_wgs84(3.0, 0.0);
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(n, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_utm_reference_points() {
        // Reference values from PROJ (EPSG:4326 -> EPSG:32630 / 32721).
        let (e, n) = Crs::from_epsg(32630).unwrap().from_wgs84(-3.7037, 40.4168);
        assert_abs_diff_eq!(e, 440_298.94, epsilon = 1.0);
        assert_abs_diff_eq!(n, 4_474_257.31, epsilon = 1.0);

        let (e, n) = Crs::from_epsg(32721).unwrap().from_wgs84(-58.3816, -34.6037);
        assert_abs_diff_eq!(e, 373_317.50, epsilon = 1.0);
        assert_abs_diff_eq!(n, 6_170_036.17, epsilon = 1.0);
    }

    #[test]
    fn test_utm_roundtrip() {
        let points = [
            (-122.3321, 47.6062, 10, true),
            (151.2093, -33.8688, 56, false),
            (2.5, 0.5, 31, true),
            (-70.6, -33.4, 19, false),
        ];
        for (lon, lat, zone, north) in points {
            let crs = Crs::Utm { zone, north };
            let (e, n) = crs.from_wgs84(lon, lat);
            let (lon2, lat2) = crs.to_wgs84(e, n);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-7);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_web_mercator_roundtrip() {
        let crs = Crs::WebMercator;
        let (x, y) = crs.from_wgs84(180.0, 0.0);
        assert_abs_diff_eq!(x, 20_037_508.342_789_244, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);

        let (x, y) = crs.from_wgs84(-122.33, 47.61);
        let (lon, lat) = crs.to_wgs84(x, y);
        assert_abs_diff_eq!(lon, -122.33, epsilon = 1e-9);
        assert_abs_diff_eq!(lat, 47.61, epsilon = 1e-9);
    }

    #[test]
    fn test_transform_bounds_encloses_corners() {
        let utm = Crs::from_epsg(32610).unwrap();
        let bounds = (-123.0, 47.0, -122.0, 48.0);
        let (min_x, min_y, max_x, max_y) = transform_bounds(Crs::Wgs84, utm, bounds);

        for (lon, lat) in [(-123.0, 47.0), (-123.0, 48.0), (-122.0, 47.0), (-122.0, 48.0)] {
            let (x, y) = utm.from_wgs84(lon, lat);
            assert!(x >= min_x - 1e-6 && x <= max_x + 1e-6);
            assert!(y >= min_y - 1e-6 && y <= max_y + 1e-6);
        }
    }

    #[test]
    fn test_extent_to_crs() {
        let extent = GeoExtent::new(500_000.0, 5_200_000.0, 510_000.0, 5_210_000.0, 32610).unwrap();
        let geographic = extent_to_crs(&extent, Crs::Wgs84).unwrap();
        assert!(geographic.is_geographic());
        assert!(geographic.min_x() < -122.9 && geographic.max_x() > -123.0);

        let unknown = GeoExtent::new(0.0, 0.0, 1.0, 1.0, 2193).unwrap();
        assert!(matches!(
            extent_to_crs(&unknown, Crs::Wgs84),
            Err(DemError::UnsupportedCrs(_))
        ));
    }
}
