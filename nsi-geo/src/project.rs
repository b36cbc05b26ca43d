//! Reprojection between geographic WGS84 and spherical Web Mercator.
//!
//! Uses the spherical formulas on the WGS84 semi-major axis, matching
//! EPSG:3857 as used by PostGIS and web map tiles.

use crate::crs::Crs;
use crate::error::{GeoError, Result};
use crate::geometry::validate;
use geo::MapCoords;
use geo_types::{Coord, Geometry};
use std::f64::consts::PI;

/// WGS84 semi-major axis in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Reproject a geometry from one CRS to another.
///
/// The input is validated first so malformed polygons surface as
/// [`GeoError::InvalidGeometry`] rather than producing corrupt output.
pub fn reproject(geom: &Geometry<f64>, from: Crs, to: Crs) -> Result<Geometry<f64>> {
    validate(geom)?;
    if from == to {
        return Ok(geom.clone());
    }
    geom.try_map_coords(move |c| transform(c, from, to))
}

/// Reproject a single coordinate.
pub fn transform(c: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>> {
    match (from, to) {
        (Crs::Wgs84, Crs::WebMercator) => wgs84_to_mercator(c),
        (Crs::WebMercator, Crs::Wgs84) => mercator_to_wgs84(c),
        _ => Ok(c),
    }
}

fn wgs84_to_mercator(c: Coord<f64>) -> Result<Coord<f64>> {
    if c.y.abs() >= 90.0 {
        return Err(GeoError::InvalidGeometry(format!(
            "latitude {} cannot be projected to Web Mercator",
            c.y
        )));
    }
    let x = EARTH_RADIUS * c.x.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + c.y.to_radians() / 2.0).tan().ln();
    Ok(Coord { x, y })
}

fn mercator_to_wgs84(c: Coord<f64>) -> Result<Coord<f64>> {
    let lon = (c.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    if !lon.is_finite() || !lat.is_finite() {
        return Err(GeoError::InvalidGeometry(format!(
            "mercator coordinate ({}, {}) has no geographic equivalent",
            c.x, c.y
        )));
    }
    Ok(Coord { x: lon, y: lat })
}
