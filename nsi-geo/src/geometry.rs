//! WKT parsing/serialization, ring assembly and structural validation.

use crate::error::{GeoError, Result};
use geo::CoordsIter;
use geo_types::{Coord, Geometry, LineString, Polygon};

/// Parse a WKT string into a `geo` geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::<f64>::from_str(wkt)
        .map_err(|e| GeoError::WktParse(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| GeoError::WktParse(format!("{:?}", e)))
        })
}

/// Serialize a geometry to WKT.
pub fn to_wkt(geom: &Geometry<f64>) -> String {
    use wkt::ToWkt;
    geom.wkt_string()
}

/// Assemble a single-ring polygon from an open sequence of vertices.
///
/// The ring is closed implicitly with the first vertex. Fails when the ring
/// has fewer than three distinct vertices.
pub fn polygon_from_pairs(coords: Vec<Coord<f64>>) -> Result<Polygon<f64>> {
    let ring = LineString::from(coords);
    check_ring(&ring)?;
    Ok(Polygon::new(ring, vec![]))
}

/// Structural validation: finite coordinates and well-formed polygon rings.
pub fn validate(geom: &Geometry<f64>) -> Result<()> {
    if let Some(c) = geom.coords_iter().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeoError::InvalidGeometry(format!(
            "non-finite coordinate ({}, {})",
            c.x, c.y
        )));
    }
    match geom {
        Geometry::Polygon(p) => check_polygon(p),
        Geometry::MultiPolygon(mp) => mp.0.iter().try_for_each(check_polygon),
        Geometry::GeometryCollection(gc) => gc.0.iter().try_for_each(validate),
        _ => Ok(()),
    }
}

fn check_polygon(p: &Polygon<f64>) -> Result<()> {
    check_ring(p.exterior())?;
    p.interiors().iter().try_for_each(check_ring)
}

fn check_ring(ring: &LineString<f64>) -> Result<()> {
    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(3);
    for c in ring.0.iter() {
        if !distinct.contains(c) {
            distinct.push(*c);
            if distinct.len() == 3 {
                return Ok(());
            }
        }
    }
    Err(GeoError::InvalidGeometry(format!(
        "polygon ring has {} distinct vertices, at least 3 required",
        distinct.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::coord;

    #[test]
    fn test_parse_polygon() {
        let geom = parse_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_wkt("POLYGON((0 0, 1"),
            Err(GeoError::WktParse(_))
        ));
    }

    #[test]
    fn test_polygon_from_pairs_closes_ring() {
        let poly = polygon_from_pairs(vec![
            coord! { x: -1.0, y: -1.0 },
            coord! { x: 1.0, y: -1.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: -1.0, y: 1.0 },
        ])
        .unwrap();
        let ring = &poly.exterior().0;
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_degenerate_ring_rejected() {
        let err = polygon_from_pairs(vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
        ])
        .unwrap_err();
        assert!(matches!(err, GeoError::InvalidGeometry(_)));

        let err = polygon_from_pairs(vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 0.0, y: 0.0 },
        ])
        .unwrap_err();
        assert!(matches!(err, GeoError::InvalidGeometry(_)));
    }

    #[test]
    fn test_wkt_roundtrip() {
        let poly = polygon_from_pairs(vec![
            coord! { x: -1.5, y: -1.0 },
            coord! { x: 1.0, y: -1.0 },
            coord! { x: 1.0, y: 1.25 },
        ])
        .unwrap();
        let geom = Geometry::Polygon(poly);
        let text = to_wkt(&geom);
        assert!(text.starts_with("POLYGON"));
        assert_eq!(parse_wkt(&text).unwrap(), geom);
    }

    #[test]
    fn test_validate_non_finite() {
        let geom = Geometry::Point(geo_types::Point::new(f64::NAN, 1.0));
        assert!(matches!(validate(&geom), Err(GeoError::InvalidGeometry(_))));
    }
}
