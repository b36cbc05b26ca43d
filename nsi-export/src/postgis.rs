//! PostGIS input source.
//!
//! The export SQL is wrapped so each row carries its geometry as WKT and its
//! attributes as a single `jsonb` object. Attribute types come from describing
//! the unwrapped statement, so any column type the database can render as
//! JSON is exportable without a typed decoder per column.

use crate::error::{ExportError, Result};
use crate::gis::{
    DataSource, FieldData, FieldDefinition, FieldType, ResultLayer, SourceDriver, SourceFeature,
};
use crate::job::GeometryFilter;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use nsi_geo::parse_wkt;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{Column, Executor, Row, TypeInfo};

const GEOM_ALIAS: &str = "__geom_wkt";
const ATTRS_ALIAS: &str = "__attrs";

/// Opens connections to the structure database for export.
#[derive(Debug, Clone)]
pub struct PostgisDriver {
    pool: PgPool,
    srid: i32,
    geometry_column: String,
}

impl PostgisDriver {
    /// Source over `pool` whose geometry column is `shape` in EPSG:4326.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            srid: 4326,
            geometry_column: "shape".to_string(),
        }
    }

    pub fn with_srid(mut self, srid: i32) -> Self {
        self.srid = srid;
        self
    }

    pub fn with_geometry_column(mut self, column: &str) -> Result<Self> {
        if column.is_empty()
            || !column
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ExportError::InvalidInput(format!(
                "invalid geometry column name '{column}'"
            )));
        }
        self.geometry_column = column.to_string();
        Ok(self)
    }
}

#[async_trait]
impl SourceDriver for PostgisDriver {
    async fn open(&self) -> Result<Box<dyn DataSource>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PostgisSource {
            conn,
            srid: self.srid,
            geometry_column: self.geometry_column.clone(),
        }))
    }
}

/// An open PostGIS connection dedicated to one export.
pub struct PostgisSource {
    conn: PoolConnection<Postgres>,
    srid: i32,
    geometry_column: String,
}

#[async_trait]
impl DataSource for PostgisSource {
    async fn execute_sql(
        self: Box<Self>,
        sql: &str,
        params: &[String],
        filter: Option<&GeometryFilter>,
    ) -> Result<ResultLayer> {
        let PostgisSource {
            mut conn,
            srid,
            geometry_column,
        } = *self;

        let described = (&mut *conn).describe(sql).await?;
        let fields: Vec<FieldDefinition> = described
            .columns()
            .iter()
            .filter(|c| {
                let type_name = c.type_info().name();
                c.name() != geometry_column
                    && !type_name.eq_ignore_ascii_case("geometry")
                    && !type_name.eq_ignore_ascii_case("geography")
            })
            .map(|c| FieldDefinition::new(c.name(), FieldType::from_db_type(c.type_info().name())))
            .collect();

        let wrapped = wrap_sql(sql, &geometry_column, srid, params.len(), filter.is_some());
        let mut binds = params.to_vec();
        if let Some(f) = filter {
            binds.push(f.wkt().to_string());
        }
        tracing::debug!(sql = %wrapped, fields = fields.len(), "export source query");

        let features = feature_stream(conn, wrapped, binds, fields.clone());
        Ok(ResultLayer {
            srid,
            fields,
            features: Box::pin(features),
        })
    }
}

/// Wrap the export statement with geometry/attribute extraction and the
/// optional intersection filter, bound after the caller's parameters.
pub fn wrap_sql(
    sql: &str,
    geometry_column: &str,
    srid: i32,
    param_count: usize,
    filtered: bool,
) -> String {
    let mut wrapped = format!(
        "SELECT st_astext(export_src.\"{geometry_column}\") AS {GEOM_ALIAS}, \
         (to_jsonb(export_src) - '{geometry_column}') AS {ATTRS_ALIAS} \
         FROM ({sql}) AS export_src"
    );
    if filtered {
        let placeholder = param_count + 1;
        let filter_geom = if srid == 4326 {
            format!("st_geomfromtext(${placeholder},4326)")
        } else {
            format!("st_transform(st_geomfromtext(${placeholder},4326),{srid})")
        };
        wrapped.push_str(&format!(
            " WHERE st_intersects(export_src.\"{geometry_column}\",{filter_geom})"
        ));
    }
    wrapped
}

fn feature_stream(
    mut conn: PoolConnection<Postgres>,
    sql: String,
    binds: Vec<String>,
    fields: Vec<FieldDefinition>,
) -> impl Stream<Item = Result<SourceFeature>> + Send + 'static {
    async_stream::try_stream! {
        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(value.as_str());
        }
        let mut rows = query.fetch(&mut *conn);
        while let Some(row) = rows.next().await {
            let row = row?;
            yield row_to_feature(&row, &fields)?;
        }
    }
}

fn row_to_feature(row: &PgRow, fields: &[FieldDefinition]) -> Result<SourceFeature> {
    let wkt: Option<String> = row.try_get(GEOM_ALIAS)?;
    let attrs: Option<Json<Value>> = row.try_get(ATTRS_ALIAS)?;
    let geometry = wkt.as_deref().map(parse_wkt).transpose()?;
    let attrs = attrs.map(|j| j.0).unwrap_or(Value::Null);
    let values = fields
        .iter()
        .map(|f| json_to_field(attrs.get(&f.name), f.field_type))
        .collect();
    Ok(SourceFeature { geometry, values })
}

/// Convert one JSON attribute to the declared field type.
pub fn json_to_field(value: Option<&Value>, field_type: FieldType) -> FieldData {
    let Some(value) = value else {
        return FieldData::Null;
    };
    match (field_type, value) {
        (_, Value::Null) => FieldData::Null,
        (FieldType::String, Value::String(s)) => FieldData::String(s.clone()),
        (FieldType::String, other) => FieldData::String(other.to_string()),
        (FieldType::Integer | FieldType::Integer64, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(FieldData::Integer)
            .unwrap_or(FieldData::Null),
        (FieldType::Real, Value::Number(n)) => {
            n.as_f64().map(FieldData::Real).unwrap_or(FieldData::Null)
        }
        (FieldType::Integer | FieldType::Integer64, Value::Bool(b)) => {
            FieldData::Integer(i64::from(*b))
        }
        (FieldType::Real, Value::Bool(b)) => FieldData::Real(if *b { 1.0 } else { 0.0 }),
        (FieldType::Integer | FieldType::Integer64, Value::String(s)) => s
            .trim()
            .parse()
            .map(FieldData::Integer)
            .unwrap_or(FieldData::Null),
        (FieldType::Real, Value::String(s)) => s
            .trim()
            .parse()
            .map(FieldData::Real)
            .unwrap_or(FieldData::Null),
        _ => FieldData::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_without_filter() {
        let sql = wrap_sql("select * from nsi where cbfips=$1", "shape", 4326, 1, false);
        assert_eq!(
            sql,
            "SELECT st_astext(export_src.\"shape\") AS __geom_wkt, \
             (to_jsonb(export_src) - 'shape') AS __attrs \
             FROM (select * from nsi where cbfips=$1) AS export_src"
        );
    }

    #[test]
    fn test_wrap_with_filter_uses_next_placeholder() {
        let sql = wrap_sql("select * from nsi where cbfips=$1", "shape", 4326, 1, true);
        assert!(sql.ends_with(
            " WHERE st_intersects(export_src.\"shape\",st_geomfromtext($2,4326))"
        ));
        let sql = wrap_sql("select * from nsi", "shape", 3857, 0, true);
        assert!(sql.contains("st_transform(st_geomfromtext($1,4326),3857)"));
    }

    #[test]
    fn test_json_conversion() {
        let attrs = json!({"a": 3, "b": 2.5, "c": "x", "d": null, "e": true, "f": "12"});
        assert_eq!(
            json_to_field(attrs.get("a"), FieldType::Integer),
            FieldData::Integer(3)
        );
        assert_eq!(
            json_to_field(attrs.get("b"), FieldType::Real),
            FieldData::Real(2.5)
        );
        assert_eq!(
            json_to_field(attrs.get("c"), FieldType::String),
            FieldData::String("x".into())
        );
        assert_eq!(json_to_field(attrs.get("d"), FieldType::Real), FieldData::Null);
        assert_eq!(
            json_to_field(attrs.get("e"), FieldType::Integer),
            FieldData::Integer(1)
        );
        assert_eq!(
            json_to_field(attrs.get("f"), FieldType::Integer64),
            FieldData::Integer(12)
        );
        assert_eq!(
            json_to_field(attrs.get("a"), FieldType::String),
            FieldData::String("3".into())
        );
        assert_eq!(json_to_field(None, FieldType::String), FieldData::Null);
    }

    #[tokio::test]
    async fn test_geometry_column_validation() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://nsi@localhost/nsi")
            .unwrap();
        let driver = PostgisDriver::new(pool);
        assert!(driver.clone().with_geometry_column("geom_4326").is_ok());
        assert!(driver.with_geometry_column("shape\"; drop").is_err());
    }
}
