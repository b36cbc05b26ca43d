//! Summary statistics: GET/POST {prefix}/stats

use super::structures::posted_geometry;
use super::{traced, FilterParams};
use crate::error::Result;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use nsi_geo::Crs;
use nsi_query::{Criteria, StructureSummary};
use std::sync::Arc;

/// Summary over structures matching `bbox` / `fips`. No filter summarizes
/// the whole inventory.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<StructureSummary>> {
    traced("stats", async move {
        let criteria = Criteria::compile(&params.bbox, &params.fips, Crs::Wgs84)?;
        let summary = state.store.summary(&criteria).await?;
        Ok(Json(summary))
    })
    .await
}

/// Summary over structures intersecting a posted GeoJSON geometry.
pub async fn stats_in_geometry(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<StructureSummary>> {
    traced("stats_in_geometry", async move {
        let criteria = Criteria::intersecting(&posted_geometry(&body)?)?;
        let summary = state.store.summary(&criteria).await?;
        Ok(Json(summary))
    })
    .await
}
