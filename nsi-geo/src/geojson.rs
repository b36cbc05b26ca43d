//! GeoJSON geometry reading and writing.
//!
//! Reading accepts a bare geometry object, a `Feature`, or a
//! `FeatureCollection` (whose first feature is used). Writing produces a bare
//! geometry object.

use crate::error::{GeoError, Result};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde_json::{json, Value};

/// Extract a geometry from a GeoJSON document.
pub fn read_geometry(doc: &Value) -> Result<Geometry<f64>> {
    let kind = type_of(doc)?;
    match kind {
        "FeatureCollection" => {
            let first = doc
                .get("features")
                .and_then(Value::as_array)
                .and_then(|f| f.first())
                .ok_or_else(|| GeoError::GeoJson("FeatureCollection has no features".into()))?;
            read_geometry(first)
        }
        "Feature" => {
            let geom = doc
                .get("geometry")
                .filter(|g| !g.is_null())
                .ok_or_else(|| GeoError::GeoJson("Feature has no geometry".into()))?;
            read_geometry(geom)
        }
        _ => read_bare(kind, doc),
    }
}

fn type_of(v: &Value) -> Result<&str> {
    v.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeoError::GeoJson("missing \"type\" member".into()))
}

fn read_bare(kind: &str, doc: &Value) -> Result<Geometry<f64>> {
    if kind == "GeometryCollection" {
        let members = doc
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| GeoError::GeoJson("GeometryCollection without geometries".into()))?;
        let geoms = members
            .iter()
            .map(read_geometry)
            .collect::<Result<Vec<_>>>()?;
        return Ok(Geometry::GeometryCollection(geoms.into()));
    }

    let coords = doc
        .get("coordinates")
        .ok_or_else(|| GeoError::GeoJson(format!("{kind} without coordinates")))?;
    let geom = match kind {
        "Point" => Geometry::Point(Point(position(coords)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint(
            positions(coords)?.into_iter().map(Point).collect(),
        )),
        "LineString" => Geometry::LineString(LineString(positions(coords)?)),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString(
            array(coords)?
                .iter()
                .map(|l| positions(l).map(LineString))
                .collect::<Result<_>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon(
            array(coords)?
                .iter()
                .map(polygon)
                .collect::<Result<_>>()?,
        )),
        other => return Err(GeoError::GeoJson(format!("unsupported type {other}"))),
    };
    Ok(geom)
}

fn array(v: &Value) -> Result<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| GeoError::GeoJson("coordinates must be arrays".into()))
}

fn position(v: &Value) -> Result<Coord<f64>> {
    let pos = array(v)?;
    match (
        pos.first().and_then(Value::as_f64),
        pos.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(GeoError::GeoJson(format!("invalid position {v}"))),
    }
}

fn positions(v: &Value) -> Result<Vec<Coord<f64>>> {
    array(v)?.iter().map(position).collect()
}

fn polygon(v: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(v)?
        .iter()
        .map(|r| positions(r).map(LineString))
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| GeoError::GeoJson("polygon without rings".into()))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

/// Render a geometry as a GeoJSON geometry object.
pub fn write_geometry(geom: &Geometry<f64>) -> Result<Value> {
    let value = match geom {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": pos(&p.0)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| pos(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::LineString(ls) => json!({"type": "LineString", "coordinates": line(ls)}),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": rings(p)}),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(rings).collect::<Vec<_>>(),
        }),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.0.iter().map(write_geometry).collect::<Result<Vec<_>>>()?,
        }),
        other => {
            return Err(GeoError::InvalidGeometry(format!(
                "no GeoJSON representation for {other:?}"
            )))
        }
    };
    Ok(value)
}

fn pos(c: &Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn line(ls: &LineString<f64>) -> Vec<Value> {
    ls.0.iter().map(pos).collect()
}

fn rings(p: &Polygon<f64>) -> Vec<Vec<Value>> {
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_feature_collection_uses_first_feature() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                }},
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Point", "coordinates": [5.0, 5.0]
                }}
            ]
        });
        let geom = read_geometry(&doc).unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
    }

    #[test]
    fn test_read_empty_collection() {
        let doc = json!({"type": "FeatureCollection", "features": []});
        assert!(matches!(read_geometry(&doc), Err(GeoError::GeoJson(_))));
    }

    #[test]
    fn test_read_bad_position() {
        let doc = json!({"type": "Point", "coordinates": ["a", 1]});
        assert!(matches!(read_geometry(&doc), Err(GeoError::GeoJson(_))));
    }

    #[test]
    fn test_write_polygon() {
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]),
            vec![],
        );
        let v = write_geometry(&Geometry::Polygon(poly)).unwrap();
        assert_eq!(v["type"], "Polygon");
        let ring = v["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[0], ring[3]);
    }

    #[test]
    fn test_read_write_agree() {
        let doc = json!({"type": "MultiPoint", "coordinates": [[1.5, 2.5], [3.0, 4.0]]});
        let geom = read_geometry(&doc).unwrap();
        assert_eq!(write_geometry(&geom).unwrap(), doc);
    }
}
