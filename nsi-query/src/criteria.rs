//! Compilation of user filters into parameterized SQL predicates.
//!
//! Two filter dimensions are supported:
//!
//! - `bbox`: a comma separated list of `x,y` pairs forming a ring, turned into
//!   an `st_intersects` predicate against the `shape` column. The polygon is
//!   rebuilt from parsed numbers, so the WKT embedded in SQL text never
//!   contains caller-supplied characters.
//! - `fips`: a census block code or prefix, always bound as a parameter.
//!
//! Placeholders are numbered in the order bbox-then-fips.

use crate::error::{QueryError, Result};
use nsi_geo::{geometry, project, Coord, Crs, Geometry};

/// Code lengths accepted for `fips`: state, county, tract, block group, block.
pub const VALID_FIPS_LENGTHS: [usize; 5] = [2, 5, 11, 12, 15];

/// Length of a full block code, compared by equality rather than prefix.
const FULL_FIPS_LENGTH: usize = 15;

/// Compile a bbox string into an intersection predicate in `target` CRS.
///
/// Empty input yields an empty predicate.
pub fn compile_bbox(raw: &str, target: Crs) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }

    let values = raw
        .split(',')
        .map(|tok| {
            let tok = tok.trim();
            tok.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| QueryError::invalid_input(format!("invalid bbox coordinate '{tok}'")))
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.len() % 2 != 0 {
        return Err(QueryError::invalid_input(format!(
            "bbox requires coordinate pairs, got {} values",
            values.len()
        )));
    }

    let ring: Vec<Coord<f64>> = values
        .chunks_exact(2)
        .map(|pair| Coord {
            x: pair[0],
            y: pair[1],
        })
        .collect();
    let polygon = Geometry::Polygon(geometry::polygon_from_pairs(ring)?);
    let polygon = project::reproject(&polygon, Crs::Wgs84, target)?;

    Ok(format!(
        "st_intersects(shape,'SRID={};{}')",
        target.epsg(),
        geometry::to_wkt(&polygon)
    ))
}

/// Compile a fips code into a predicate, appending its value to `params`.
///
/// Empty input yields an empty predicate and leaves `params` untouched.
pub fn compile_fips(raw: &str, mut params: Vec<String>) -> Result<(String, Vec<String>)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok((String::new(), params));
    }
    let len = raw.len();
    if !VALID_FIPS_LENGTHS.contains(&len) {
        return Err(QueryError::invalid_input(format!(
            "invalid fips length {len}, expected one of {VALID_FIPS_LENGTHS:?}"
        )));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QueryError::invalid_input("fips must contain only digits"));
    }

    params.push(raw.to_string());
    let ordinal = params.len();
    let predicate = if len == FULL_FIPS_LENGTH {
        format!("cbfips=${ordinal}")
    } else {
        format!("substr(cbfips,1,{len})=${ordinal}")
    };
    Ok((predicate, params))
}

/// Join compiled predicates into a clause.
///
/// Returns an empty string when both are empty, never a bare `WHERE`.
pub fn build_criteria(bbox: &str, fips: &str) -> String {
    match (bbox.is_empty(), fips.is_empty()) {
        (true, true) => String::new(),
        (false, true) => format!("WHERE {bbox}"),
        (true, false) => format!("WHERE {fips}"),
        (false, false) => format!("WHERE {bbox} AND {fips}"),
    }
}

/// A compiled `WHERE` clause with its ordered bind parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub clause: String,
    pub params: Vec<String>,
}

impl Criteria {
    /// Compile the bbox and fips filters against `crs`.
    pub fn compile(bbox: &str, fips: &str, crs: Crs) -> Result<Self> {
        let bbox_predicate = compile_bbox(bbox, crs)?;
        let (fips_predicate, params) = compile_fips(fips, Vec::new())?;
        Ok(Self {
            clause: build_criteria(&bbox_predicate, &fips_predicate),
            params,
        })
    }

    /// Intersection with a caller-supplied WGS84 geometry, bound as WKT.
    pub fn intersecting(geom: &Geometry<f64>) -> Result<Self> {
        geometry::validate(geom)?;
        Ok(Self {
            clause: "WHERE st_intersects(shape,st_geomfromtext($1,4326))".to_string(),
            params: vec![geometry::to_wkt(geom)],
        })
    }

    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }

    /// Append the clause to a select statement.
    pub fn apply(&self, select: &str) -> String {
        if self.clause.is_empty() {
            select.trim_end().to_string()
        } else {
            format!("{} {}", select.trim_end(), self.clause)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_geo::parse_wkt;

    fn ring_of(predicate: &str) -> (String, Vec<(f64, f64)>) {
        let start = predicate.find("'SRID=").unwrap() + 1;
        let end = predicate.rfind('\'').unwrap();
        let literal = &predicate[start..end];
        let (srid, wkt) = literal.split_once(';').unwrap();
        let Geometry::Polygon(p) = parse_wkt(wkt).unwrap() else {
            panic!("expected polygon in {predicate}");
        };
        let coords = p.exterior().0.iter().map(|c| (c.x, c.y)).collect();
        (srid.to_string(), coords)
    }

    #[test]
    fn test_fips_lengths() {
        for len in 0..=20usize {
            if len == 0 {
                continue;
            }
            let code = "1".repeat(len);
            let result = compile_fips(&code, Vec::new());
            if VALID_FIPS_LENGTHS.contains(&len) {
                let (predicate, params) = result.unwrap();
                assert_eq!(params, vec![code.clone()]);
                if len == 15 {
                    assert_eq!(predicate, "cbfips=$1");
                } else {
                    assert_eq!(predicate, format!("substr(cbfips,1,{len})=$1"));
                }
            } else {
                assert!(
                    matches!(result, Err(QueryError::InvalidInput(_))),
                    "length {len} should be rejected"
                );
            }
        }
    }

    #[test]
    fn test_fips_appends_to_existing_params() {
        let (predicate, params) =
            compile_fips("06037", vec!["earlier".to_string()]).unwrap();
        assert_eq!(predicate, "substr(cbfips,1,5)=$2");
        assert_eq!(params, vec!["earlier".to_string(), "06037".to_string()]);
    }

    #[test]
    fn test_fips_value_never_in_sql() {
        let (predicate, _) = compile_fips("12", Vec::new()).unwrap();
        assert!(!predicate.contains("12'"));
        assert!(compile_fips("1' OR '1", Vec::new()).is_err());
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(compile_bbox("", Crs::Wgs84).unwrap(), "");
        assert_eq!(compile_bbox("   ", Crs::Wgs84).unwrap(), "");
        let (predicate, params) = compile_fips("", Vec::new()).unwrap();
        assert!(predicate.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_bbox_odd_count() {
        assert!(matches!(
            compile_bbox("-1,-1,1,-1,1", Crs::Wgs84),
            Err(QueryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bbox_non_numeric() {
        for raw in ["-1,-1,1,abc,1,1", "-1,-1,1,-1,1,NaN", "1,,2,3"] {
            assert!(
                matches!(compile_bbox(raw, Crs::Wgs84), Err(QueryError::InvalidInput(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_bbox_degenerate_ring() {
        assert!(matches!(
            compile_bbox("0,0,1,1", Crs::Wgs84),
            Err(QueryError::Geometry(_))
        ));
    }

    #[test]
    fn test_bbox_wgs84_scenario() {
        let predicate = compile_bbox("-1,-1,1,-1,1,1,-1,1", Crs::Wgs84).unwrap();
        assert!(predicate.starts_with("st_intersects(shape,'SRID=4326;POLYGON"));
        let (srid, coords) = ring_of(&predicate);
        assert_eq!(srid, "SRID=4326");
        assert_eq!(
            coords,
            vec![(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0)]
        );
    }

    #[test]
    fn test_bbox_mercator_scenario() {
        let predicate = compile_bbox("-1,-1,1,-1,1,1,-1,1", Crs::WebMercator).unwrap();
        let (srid, coords) = ring_of(&predicate);
        assert_eq!(srid, "SRID=3857");
        assert_eq!(coords.len(), 5);
        let m = 111_319.490_793;
        let n = 111_325.142_866;
        let expected = [(-m, -n), (m, -n), (m, n), (-m, n), (-m, -n)];
        for ((x, y), (ex, ey)) in coords.iter().zip(expected) {
            assert!((x - ex).abs() < 1e-3, "{x} vs {ex}");
            assert!((y - ey).abs() < 1e-3, "{y} vs {ey}");
        }
    }

    #[test]
    fn test_bbox_tolerates_whitespace() {
        assert!(compile_bbox(" -1, -1, 1,-1 ,1,1,-1,1 ", Crs::Wgs84).is_ok());
    }

    #[test]
    fn test_build_criteria_combinations() {
        assert_eq!(build_criteria("", ""), "");
        assert_eq!(build_criteria("A", ""), "WHERE A");
        assert_eq!(build_criteria("", "B"), "WHERE B");
        assert_eq!(build_criteria("A", "B"), "WHERE A AND B");
    }

    #[test]
    fn test_criteria_never_bare_where() {
        let none = Criteria::compile("", "", Crs::Wgs84).unwrap();
        assert!(none.is_empty());
        assert_eq!(none.apply("SELECT * FROM nsi "), "SELECT * FROM nsi");

        let both = Criteria::compile("-1,-1,1,-1,1,1", "06", Crs::Wgs84).unwrap();
        assert!(both.clause.starts_with("WHERE st_intersects("));
        assert!(both.clause.ends_with(" AND substr(cbfips,1,2)=$1"));
        assert_eq!(both.params, vec!["06".to_string()]);
    }

    #[test]
    fn test_intersecting_binds_wkt() {
        let geom = Geometry::Polygon(
            geometry::polygon_from_pairs(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
            ])
            .unwrap(),
        );
        let criteria = Criteria::intersecting(&geom).unwrap();
        assert!(criteria.clause.contains("$1"));
        assert!(criteria.params[0].starts_with("POLYGON"));
    }
}
