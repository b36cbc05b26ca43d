//! Structure reads: GET/POST {prefix}/structures, GET {prefix}/structure/:id

use super::{traced, FilterParams};
use crate::error::{Result, ServerError};
use crate::state::AppState;
use crate::streaming::stream_features;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use nsi_geo::{geojson, Crs};
use nsi_query::{write_feature, Criteria, OutputFormat};
use serde::Deserialize;
use std::sync::Arc;

/// `fmt` query parameter of the POST route.
#[derive(Debug, Default, Deserialize)]
pub struct FormatParam {
    #[serde(default)]
    pub fmt: String,
}

/// Stream structures matching `bbox` / `fips`.
///
/// GET {prefix}/structures?bbox=&fips=&fmt=fc|fa|fs
pub async fn structures(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<Response> {
    traced("structures", async move {
        let format: OutputFormat = params.fmt.parse()?;
        let criteria = Criteria::compile(&params.bbox, &params.fips, Crs::Wgs84)?;
        tracing::info!(
            format = format.as_str(),
            bbox = !params.bbox.is_empty(),
            fips = !params.fips.is_empty(),
            "structure query"
        );
        stream(&state, criteria, format).await
    })
    .await
}

/// Stream structures intersecting a posted GeoJSON geometry.
///
/// POST {prefix}/structures?fmt=fc|fa|fs
pub async fn structures_in_geometry(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FormatParam>,
    body: Bytes,
) -> Result<Response> {
    traced("structures_in_geometry", async move {
        let format: OutputFormat = params.fmt.parse()?;
        let criteria = Criteria::intersecting(&posted_geometry(&body)?)?;
        tracing::info!(format = format.as_str(), "structure query by geometry");
        stream(&state, criteria, format).await
    })
    .await
}

async fn stream(state: &AppState, criteria: Criteria, format: OutputFormat) -> Result<Response> {
    let store = state.store.clone();
    stream_features(format.content_type(), move |mut sink| async move {
        store.structures(&criteria, format, &mut sink).await
    })
    .await
}

/// One structure as a GeoJSON feature.
///
/// GET {prefix}/structure/:id
pub async fn structure(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response> {
    traced("structure", async move {
        let fd_id: i32 = id
            .trim()
            .parse()
            .map_err(|_| ServerError::bad_request(format!("invalid structure id '{id}'")))?;
        let record = state
            .store
            .structure_by_id(fd_id)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("structure {fd_id}")))?;

        let mut body = String::with_capacity(1024);
        write_feature(&record, &mut body)?;
        Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
    })
    .await
}

/// Parse a posted GeoJSON geometry, Feature or FeatureCollection.
pub(super) fn posted_geometry(body: &[u8]) -> Result<nsi_geo::Geometry<f64>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServerError::bad_request("a GeoJSON geometry body is required"));
    }
    let doc: serde_json::Value = serde_json::from_slice(body)?;
    Ok(geojson::read_geometry(&doc)?)
}
