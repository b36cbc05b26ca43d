//! Hexbin aggregate retrieval.
//!
//! Hexbin tables hold precomputed [`StructureSummary`] rows per hexagonal
//! cell, with cell polygons stored in Web Mercator. Dataset keys resolve
//! through a fixed allow-list so table names never come from the caller.

use crate::encoder::FeatureRecord;
use crate::error::{QueryError, Result};
use crate::record::{write_fields, write_value, FieldValue};
use crate::summary::{StructureSummary, SUMMARY_COLUMNS, SUMMARY_FIELDS};
use nsi_geo::{geojson, parse_wkt, reproject, Crs};

/// Known hexbin datasets: public key and backing table.
pub static HEXBIN_DATASETS: &[(&str, &str)] = &[
    ("hb10k", "hexbin_10000"),
    ("hb2500", "hexbin_2500"),
    ("hb500", "hexbin_500"),
];

/// Storage CRS of hexbin cell polygons.
pub const HEXBIN_CRS: Crs = Crs::WebMercator;

/// Resolve a dataset key to its table name.
pub fn resolve_dataset(key: &str) -> Result<&'static str> {
    HEXBIN_DATASETS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, table)| *table)
        .ok_or_else(|| QueryError::invalid_input(format!("invalid hexbin dataset '{key}'")))
}

/// Select statement for a resolved hexbin table.
///
/// The stored `shape` is decoded to WKT by PostGIS (`st_astext`) rather than
/// fetched as WKB; [`HexbinRow::write_geometry`] parses that text before
/// reprojecting. Both carry the same Web Mercator polygon.
pub fn hexbin_select(table: &'static str) -> String {
    format!("SELECT id::int4 AS id, st_astext(shape) AS shape, {SUMMARY_COLUMNS} FROM {table}")
}

/// One hexbin cell.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct HexbinRow {
    pub id: i32,
    /// Cell polygon as WKT in [`HEXBIN_CRS`].
    pub shape: String,
    #[sqlx(flatten)]
    pub summary: StructureSummary,
}

impl FeatureRecord for HexbinRow {
    fn write_geometry(&self, out: &mut String) -> Result<()> {
        let stored = parse_wkt(&self.shape)?;
        let geographic = reproject(&stored, HEXBIN_CRS, Crs::Wgs84)?;
        out.push_str(&geojson::write_geometry(&geographic)?.to_string());
        Ok(())
    }

    fn write_properties(&self, out: &mut String) -> Result<()> {
        out.push_str(r#"{"OBJECTID":"#);
        write_value(out, FieldValue::Int(Some(i64::from(self.id))))?;
        write_fields(out, SUMMARY_FIELDS, &self.summary, true)?;
        out.push('}');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode, OutputFormat};
    use futures::stream;

    fn cell(id: i32) -> HexbinRow {
        // ~1 degree square around the origin, in meters
        HexbinRow {
            id,
            shape: "POLYGON((0 0,111319.49079327357 0,111319.49079327357 111325.14286638486,0 0))"
                .to_string(),
            summary: StructureSummary {
                num_structures: Some(12),
                val_struct_sum: Some(1_000_000.456),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_allow_list() {
        assert_eq!(resolve_dataset("hb10k").unwrap(), "hexbin_10000");
        assert_eq!(resolve_dataset("hb2500").unwrap(), "hexbin_2500");
        assert_eq!(resolve_dataset("hb500").unwrap(), "hexbin_500");
        for key in ["", "hexbin_500", "nsi; drop table nsi", "HB10K"] {
            assert!(matches!(
                resolve_dataset(key),
                Err(QueryError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_select_uses_table() {
        let sql = hexbin_select("hexbin_2500");
        assert!(sql.ends_with("FROM hexbin_2500"));
        assert!(sql.contains("st_astext(shape) AS shape"));
    }

    #[test]
    fn test_geometry_is_reprojected() {
        let mut out = String::new();
        cell(1).write_geometry(&mut out).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["type"], "Polygon");
        let corner = &v["coordinates"][0][2];
        assert!((corner[0].as_f64().unwrap() - 1.0).abs() < 1e-6);
        assert!((corner[1].as_f64().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_properties_start_with_objectid() {
        let mut out = String::new();
        cell(77).write_properties(&mut out).unwrap();
        assert!(out.starts_with(r#"{"OBJECTID":77,"num_structures":12,"#));
        assert!(out.contains(r#""val_struct_sum":1000000.46"#));
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 22);
    }

    #[test]
    fn test_bad_geometry_surfaces() {
        let mut row = cell(2);
        row.shape = "POLYGON((0 0,1 1,0 0))".to_string();
        let mut out = String::new();
        assert!(matches!(
            row.write_geometry(&mut out),
            Err(QueryError::Geometry(_))
        ));
    }

    #[tokio::test]
    async fn test_encode_collection() {
        let rows = vec![Ok::<_, QueryError>(cell(1)), Ok(cell(2))];
        let mut sink = Vec::new();
        let n = encode(stream::iter(rows), OutputFormat::Collection, &mut sink)
            .await
            .unwrap();
        assert_eq!(n, 2);
        let v: serde_json::Value = serde_json::from_slice(&sink).unwrap();
        assert_eq!(v["features"][1]["properties"]["OBJECTID"], 2);
    }
}
