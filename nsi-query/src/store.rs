//! PostGIS-backed reads.

use crate::criteria::Criteria;
use crate::encoder::{encode, FeatureSink, OutputFormat};
use crate::error::{QueryError, Result};
use crate::hexbin::{hexbin_select, resolve_dataset, HexbinRow, HEXBIN_CRS};
use crate::record::{StructureRecord, STRUCTURE_SELECT};
use crate::summary::{StructureSummary, SUMMARY_SELECT};
use sqlx::postgres::PgPool;
use tracing::debug;

/// Read access to the structure inventory and its hexbin aggregates.
#[derive(Debug, Clone)]
pub struct StructureStore {
    pool: PgPool,
}

impl StructureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Stream structures matching `criteria` to `sink`.
    pub async fn structures<K>(
        &self,
        criteria: &Criteria,
        format: OutputFormat,
        sink: &mut K,
    ) -> Result<u64>
    where
        K: FeatureSink + ?Sized,
    {
        let sql = criteria.apply(STRUCTURE_SELECT);
        debug!(sql = %sql, params = criteria.params.len(), "structure query");
        let mut query = sqlx::query_as::<_, StructureRecord>(&sql);
        for param in &criteria.params {
            query = query.bind(param.as_str());
        }
        encode(query.fetch(&self.pool), format, sink).await
    }

    /// Fetch one structure by `fd_id`.
    pub async fn structure_by_id(&self, fd_id: i32) -> Result<Option<StructureRecord>> {
        let sql = format!("{STRUCTURE_SELECT} WHERE fd_id=$1");
        let record = sqlx::query_as::<_, StructureRecord>(&sql)
            .bind(fd_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Summary statistics over structures matching `criteria`.
    pub async fn summary(&self, criteria: &Criteria) -> Result<StructureSummary> {
        let sql = criteria.apply(SUMMARY_SELECT);
        debug!(sql = %sql, "summary query");
        let mut query = sqlx::query_as::<_, StructureSummary>(&sql);
        for param in &criteria.params {
            query = query.bind(param.as_str());
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    /// Stream the hexbin cells of `dataset` intersecting `bbox` as a
    /// feature collection.
    ///
    /// The dataset key and bbox are validated before any query is issued.
    pub async fn hexbins<K>(&self, dataset: &str, bbox: &str, sink: &mut K) -> Result<u64>
    where
        K: FeatureSink + ?Sized,
    {
        let table = resolve_dataset(dataset)?;
        if bbox.trim().is_empty() {
            return Err(QueryError::invalid_input(
                "hexbin dataset and bounding box are required",
            ));
        }
        let criteria = Criteria::compile(bbox, "", HEXBIN_CRS)?;
        let sql = criteria.apply(&hexbin_select(table));
        debug!(sql = %sql, dataset, "hexbin query");
        let rows = sqlx::query_as::<_, HexbinRow>(&sql).fetch(&self.pool);
        encode(rows, OutputFormat::Collection, sink).await
    }
}
