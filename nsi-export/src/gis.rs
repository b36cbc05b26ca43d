//! Vector data source and sink abstractions used by export workers.
//!
//! A [`SourceDriver`] opens a [`DataSource`] that runs SQL and yields a
//! [`ResultLayer`]; an [`OutputDriver`] creates an [`OutputDataSource`] that
//! receives one layer of point features.

use crate::error::Result;
use crate::job::GeometryFilter;
use async_trait::async_trait;
use futures::stream::BoxStream;
use nsi_geo::{Geometry, Point};
use std::path::Path;

/// Attribute type of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Integer64,
    Real,
    String,
}

impl FieldType {
    /// Map a database type name to a field type. Unknown types become strings.
    pub fn from_db_type(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "INT2" | "INT4" | "BOOL" | "SMALLINT" | "INTEGER" | "BOOLEAN" => FieldType::Integer,
            "INT8" | "BIGINT" => FieldType::Integer64,
            "FLOAT4" | "FLOAT8" | "NUMERIC" | "REAL" | "DOUBLE PRECISION" => FieldType::Real,
            _ => FieldType::String,
        }
    }
}

/// Name and type of one attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Null,
    Integer(i64),
    Real(f64),
    String(String),
}

/// A feature read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    pub geometry: Option<Geometry<f64>>,
    /// Values in the order of [`ResultLayer::fields`].
    pub values: Vec<FieldData>,
}

/// Result of executing SQL against a source.
pub struct ResultLayer {
    pub srid: i32,
    pub fields: Vec<FieldDefinition>,
    pub features: BoxStream<'static, Result<SourceFeature>>,
}

/// Opens input data sources.
#[async_trait]
pub trait SourceDriver: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DataSource>>;
}

/// An open input data source.
#[async_trait]
pub trait DataSource: Send {
    /// Run `sql`, optionally restricted to features intersecting `filter`.
    async fn execute_sql(
        self: Box<Self>,
        sql: &str,
        params: &[String],
        filter: Option<&GeometryFilter>,
    ) -> Result<ResultLayer>;
}

/// Creates output data sources at a path.
#[async_trait]
pub trait OutputDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(&self, path: &Path) -> Result<Box<dyn OutputDataSource>>;
}

/// An output data source holding one point layer.
#[async_trait]
pub trait OutputDataSource: Send {
    async fn create_layer(
        &mut self,
        name: &str,
        srid: i32,
        fields: &[FieldDefinition],
    ) -> Result<()>;

    /// Write one feature; `values` follow the layer's field order.
    async fn write_feature(&mut self, geometry: Option<&Point<f64>>, values: &[FieldData])
        -> Result<()>;

    /// Flush and close. Nothing is guaranteed durable before this returns.
    async fn finish(self: Box<Self>) -> Result<()>;
}

/// Narrow a source geometry to the point layer type.
///
/// Single-member multipoints collapse to their point; anything else has no
/// point form and yields `None`.
pub fn narrow_to_point(geometry: Option<&Geometry<f64>>) -> Option<Point<f64>> {
    match geometry? {
        Geometry::Point(p) => Some(*p),
        Geometry::MultiPoint(mp) if mp.0.len() == 1 => Some(mp.0[0]),
        _ => None,
    }
}
