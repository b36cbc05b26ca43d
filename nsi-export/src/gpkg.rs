//! GeoPackage output driver.
//!
//! Writes a single point feature layer into a new SQLite file following the
//! GeoPackage 1.3 layout: the three core metadata tables, one feature table
//! with an integer `fid`, and geometries stored as GeoPackage binary blobs
//! encoded by `geozero`. All writes happen inside one transaction
//! committed by [`OutputDataSource::finish`].

use crate::error::{ExportError, Result};
use crate::gis::{FieldData, FieldDefinition, FieldType, OutputDataSource, OutputDriver};
use async_trait::async_trait;
use geozero::{CoordDimensions, ToWkb};
use nsi_geo::{Geometry, Point};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};

/// `GPKG` in ASCII.
const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10300;
/// Column holding feature geometries.
pub const GEOMETRY_COLUMN: &str = "shape";

const WGS84_DEFINITION: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;
const MERCATOR_DEFINITION: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1],AXIS["X",EAST],AXIS["Y",NORTH],AUTHORITY["EPSG","3857"]]"#;

const CORE_TABLES: [&str; 3] = [
    "CREATE TABLE gpkg_spatial_ref_sys (\
       srs_name TEXT NOT NULL,\
       srs_id INTEGER NOT NULL PRIMARY KEY,\
       organization TEXT NOT NULL,\
       organization_coordsys_id INTEGER NOT NULL,\
       definition TEXT NOT NULL,\
       description TEXT)",
    "CREATE TABLE gpkg_contents (\
       table_name TEXT NOT NULL PRIMARY KEY,\
       data_type TEXT NOT NULL,\
       identifier TEXT UNIQUE,\
       description TEXT DEFAULT '',\
       last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),\
       min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,\
       srs_id INTEGER,\
       CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id))",
    "CREATE TABLE gpkg_geometry_columns (\
       table_name TEXT NOT NULL,\
       column_name TEXT NOT NULL,\
       geometry_type_name TEXT NOT NULL,\
       srs_id INTEGER NOT NULL,\
       z TINYINT NOT NULL,\
       m TINYINT NOT NULL,\
       CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),\
       CONSTRAINT uk_gc_table_name UNIQUE (table_name),\
       CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),\
       CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id))",
];

/// Creates GeoPackage files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPackageDriver;

#[async_trait]
impl OutputDriver for GeoPackageDriver {
    fn name(&self) -> &'static str {
        "GPKG"
    }

    async fn create(&self, path: &Path) -> Result<Box<dyn OutputDataSource>> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::warn!(path = %path.display(), "replacing existing artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await?;

        sqlx::query(&format!("PRAGMA application_id = {APPLICATION_ID}"))
            .execute(&mut conn)
            .await?;
        sqlx::query(&format!("PRAGMA user_version = {USER_VERSION}"))
            .execute(&mut conn)
            .await?;
        sqlx::query("BEGIN").execute(&mut conn).await?;
        for ddl in CORE_TABLES {
            sqlx::query(ddl).execute(&mut conn).await?;
        }
        for (name, id, definition, description) in [
            (
                "Undefined cartesian SRS",
                -1,
                "undefined",
                "undefined cartesian coordinate reference system",
            ),
            (
                "Undefined geographic SRS",
                0,
                "undefined",
                "undefined geographic coordinate reference system",
            ),
            (
                "WGS 84 geodetic",
                4326,
                WGS84_DEFINITION,
                "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
            ),
        ] {
            let organization = if id > 0 { "EPSG" } else { "NONE" };
            insert_srs(&mut conn, name, id, organization, definition, description).await?;
        }

        Ok(Box::new(GeoPackageWriter {
            conn,
            path: path.to_path_buf(),
            layer: None,
        }))
    }
}

async fn insert_srs(
    conn: &mut SqliteConnection,
    name: &str,
    id: i32,
    organization: &str,
    definition: &str,
    description: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO gpkg_spatial_ref_sys \
         (srs_name, srs_id, organization, organization_coordsys_id, definition, description) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(id)
    .bind(organization)
    .bind(id)
    .bind(definition)
    .bind(description)
    .execute(conn)
    .await?;
    Ok(())
}

/// Quote an SQLite identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(t: FieldType) -> &'static str {
    match t {
        FieldType::Integer | FieldType::Integer64 => "INTEGER",
        FieldType::Real => "REAL",
        FieldType::String => "TEXT",
    }
}

/// Encode a point as a GeoPackage geometry blob without envelope.
pub fn geometry_blob(point: &Point<f64>, srid: i32) -> Result<Vec<u8>> {
    Ok(Geometry::Point(*point).to_gpkg_wkb(CoordDimensions::xy(), Some(srid), Vec::new())?)
}

struct LayerState {
    name: String,
    insert_sql: String,
    field_count: usize,
    srid: i32,
    extent: Option<[f64; 4]>,
    features: u64,
}

struct GeoPackageWriter {
    conn: SqliteConnection,
    path: PathBuf,
    layer: Option<LayerState>,
}

#[async_trait]
impl OutputDataSource for GeoPackageWriter {
    async fn create_layer(
        &mut self,
        name: &str,
        srid: i32,
        fields: &[FieldDefinition],
    ) -> Result<()> {
        if self.layer.is_some() {
            return Err(ExportError::InvalidInput(
                "GeoPackage writer holds a single layer".into(),
            ));
        }
        match srid {
            -1 | 0 | 4326 => {}
            3857 => {
                insert_srs(
                    &mut self.conn,
                    "WGS 84 / Pseudo-Mercator",
                    3857,
                    "EPSG",
                    MERCATOR_DEFINITION,
                    "spherical mercator",
                )
                .await?
            }
            other => {
                let name = format!("EPSG:{other}");
                insert_srs(&mut self.conn, &name, other, "EPSG", "undefined", "").await?
            }
        }

        let table = quote_ident(name);
        let geom = quote_ident(GEOMETRY_COLUMN);
        let mut ddl = format!(
            "CREATE TABLE {table} (fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, {geom} POINT"
        );
        for field in fields {
            ddl.push_str(&format!(
                ", {} {}",
                quote_ident(&field.name),
                column_type(field.field_type)
            ));
        }
        ddl.push(')');
        sqlx::query(&ddl).execute(&mut self.conn).await?;

        sqlx::query(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
             VALUES (?, 'features', ?, ?)",
        )
        .bind(name)
        .bind(name)
        .bind(srid)
        .execute(&mut self.conn)
        .await?;
        sqlx::query(
            "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m) \
             VALUES (?, ?, 'POINT', ?, 0, 0)",
        )
        .bind(name)
        .bind(GEOMETRY_COLUMN)
        .bind(srid)
        .execute(&mut self.conn)
        .await?;

        let columns: Vec<String> = std::iter::once(geom)
            .chain(fields.iter().map(|f| quote_ident(&f.name)))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        self.layer = Some(LayerState {
            insert_sql: format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            ),
            name: name.to_string(),
            field_count: fields.len(),
            srid,
            extent: None,
            features: 0,
        });
        Ok(())
    }

    async fn write_feature(
        &mut self,
        geometry: Option<&Point<f64>>,
        values: &[FieldData],
    ) -> Result<()> {
        let layer = self
            .layer
            .as_mut()
            .ok_or_else(|| ExportError::InvalidInput("no layer created".into()))?;
        if values.len() != layer.field_count {
            return Err(ExportError::InvalidInput(format!(
                "feature has {} values, layer has {} fields",
                values.len(),
                layer.field_count
            )));
        }

        let blob = geometry
            .map(|p| geometry_blob(p, layer.srid))
            .transpose()?;
        let mut query = sqlx::query(&layer.insert_sql).bind(blob);
        for value in values {
            query = match value {
                FieldData::Null => query.bind(None::<i64>),
                FieldData::Integer(v) => query.bind(*v),
                FieldData::Real(v) => query.bind(*v),
                FieldData::String(v) => query.bind(v.as_str()),
            };
        }
        query.execute(&mut self.conn).await?;

        if let Some(p) = geometry {
            let e = layer
                .extent
                .get_or_insert([p.x(), p.y(), p.x(), p.y()]);
            e[0] = e[0].min(p.x());
            e[1] = e[1].min(p.y());
            e[2] = e[2].max(p.x());
            e[3] = e[3].max(p.y());
        }
        layer.features += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        if let Some(layer) = &this.layer {
            let [min_x, min_y, max_x, max_y] = match layer.extent {
                Some(e) => e.map(Some),
                None => [None; 4],
            };
            sqlx::query(
                "UPDATE gpkg_contents SET min_x = ?, min_y = ?, max_x = ?, max_y = ?, \
                 last_change = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE table_name = ?",
            )
            .bind(min_x)
            .bind(min_y)
            .bind(max_x)
            .bind(max_y)
            .bind(&layer.name)
            .execute(&mut this.conn)
            .await?;
            tracing::debug!(
                path = %this.path.display(),
                features = layer.features,
                "GeoPackage layer written"
            );
        }
        sqlx::query("COMMIT").execute(&mut this.conn).await?;
        this.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    fn fields() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("fd_id", FieldType::Integer),
            FieldDefinition::new("val_struct", FieldType::Real),
            FieldDefinition::new("occtype", FieldType::String),
        ]
    }

    #[test]
    fn test_blob_header() {
        let blob = geometry_blob(&Point::new(-90.0, 38.0), 4326).unwrap();
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[2], 0);
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 4326);
        // Header without envelope, then a 21-byte little-endian WKB point.
        assert_eq!(blob.len(), 8 + 21);
        let wkb = &blob[8..];
        assert_eq!(wkb[0], 1);
        assert_eq!(u32::from_le_bytes(wkb[1..5].try_into().unwrap()), 1);
        assert_eq!(f64::from_le_bytes(wkb[5..13].try_into().unwrap()), -90.0);
        assert_eq!(f64::from_le_bytes(wkb[13..21].try_into().unwrap()), 38.0);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_write_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpkg");

        let mut out = GeoPackageDriver.create(&path).await.unwrap();
        out.create_layer("nsi_export", 4326, &fields()).await.unwrap();
        out.write_feature(
            Some(&Point::new(-90.0, 38.0)),
            &[
                FieldData::Integer(1),
                FieldData::Real(100.5),
                FieldData::String("RES1".into()),
            ],
        )
        .await
        .unwrap();
        out.write_feature(
            Some(&Point::new(-91.0, 39.0)),
            &[FieldData::Integer(2), FieldData::Null, FieldData::Null],
        )
        .await
        .unwrap();
        out.finish().await.unwrap();

        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .connect()
            .await
            .unwrap();
        let app_id: i32 = sqlx::query("PRAGMA application_id")
            .fetch_one(&mut conn)
            .await
            .unwrap()
            .get(0);
        assert_eq!(app_id, APPLICATION_ID);

        let rows = sqlx::query(
            "SELECT fid, shape, fd_id, val_struct, occtype FROM nsi_export ORDER BY fid",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        let blob: Vec<u8> = rows[0].get("shape");
        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(rows[0].get::<String, _>("occtype"), "RES1");
        assert_eq!(rows[1].get::<Option<f64>, _>("val_struct"), None);

        let (min_x, max_y): (f64, f64) =
            sqlx::query_as("SELECT min_x, max_y FROM gpkg_contents WHERE table_name = 'nsi_export'")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert_eq!(min_x, -91.0);
        assert_eq!(max_y, 39.0);

        let geom_type: String =
            sqlx::query_scalar("SELECT geometry_type_name FROM gpkg_geometry_columns")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert_eq!(geom_type, "POINT");
    }

    #[tokio::test]
    async fn test_value_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = GeoPackageDriver
            .create(&dir.path().join("bad.gpkg"))
            .await
            .unwrap();
        out.create_layer("nsi_export", 4326, &fields()).await.unwrap();
        let err = out
            .write_feature(None, &[FieldData::Integer(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_layer_without_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gpkg");
        let mut out = GeoPackageDriver.create(&path).await.unwrap();
        out.create_layer("nsi_export", 4326, &[]).await.unwrap();
        out.finish().await.unwrap();
        assert!(path.exists());
    }
}
