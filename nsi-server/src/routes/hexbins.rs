//! GET {prefix}/hexbins/:dataset

use super::{traced, FilterParams};
use crate::error::Result;
use crate::state::AppState;
use crate::streaming::stream_features;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use nsi_query::{resolve_dataset, OutputFormat, QueryError};
use std::sync::Arc;

/// Hexbin aggregates of an allow-listed dataset intersecting `bbox`
/// (Web Mercator), returned as a WGS84 feature collection.
pub async fn hexbins(
    State(state): State<Arc<AppState>>,
    Path(dataset): Path<String>,
    Query(params): Query<FilterParams>,
) -> Result<Response> {
    traced("hexbins", async move {
        // Reject before spawning the producer.
        let table = resolve_dataset(&dataset)?;
        if params.bbox.trim().is_empty() {
            return Err(QueryError::invalid_input("bbox is required for hexbins").into());
        }
        tracing::info!(dataset = %dataset, table, "hexbin query");

        let store = state.store.clone();
        stream_features(OutputFormat::Collection.content_type(), move |mut sink| async move {
            store.hexbins(&dataset, &params.bbox, &mut sink).await
        })
        .await
    })
    .await
}
