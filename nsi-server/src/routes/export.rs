//! Export jobs and downloads under {prefix}/export

use super::structures::posted_geometry;
use super::{traced, FilterParams};
use crate::blob::validate_name;
use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use nsi_export::{ExportSpec, GeometryFilter, JobToken};
use nsi_geo::Crs;
use nsi_query::Criteria;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Source query of every export; filters are appended or applied by the source.
pub const EXPORT_SELECT: &str = "SELECT * FROM nsi";

/// File name offered for downloaded artifacts.
pub const DOWNLOAD_FILE_NAME: &str = "nsi_export.gpkg";

const GEOPACKAGE_CONTENT_TYPE: &str = "application/geopackage+sqlite3";

/// Start an export filtered by `bbox` and/or `fips`; returns the job token.
///
/// GET {prefix}/export?bbox=&fips=
pub async fn create(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<String> {
    traced("export_create", async move {
        let criteria = Criteria::compile(&params.bbox, &params.fips, Crs::Wgs84)?;
        if criteria.is_empty() {
            return Err(ServerError::bad_request("export requires a bbox or fips filter"));
        }
        let spec = ExportSpec::new(criteria.apply(EXPORT_SELECT), criteria.params);
        let token = state.exports.submit(spec).await?;
        Ok(token.to_string())
    })
    .await
}

/// Start an export restricted to a posted GeoJSON geometry.
///
/// POST {prefix}/export
pub async fn create_from_geometry(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<String> {
    traced("export_create_from_geometry", async move {
        let filter = GeometryFilter::new(posted_geometry(&body)?)?;
        let spec = ExportSpec::new(EXPORT_SELECT, Vec::new()).with_geometry_filter(filter);
        let token = state.exports.submit(spec).await?;
        Ok(token.to_string())
    })
    .await
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// GET {prefix}/export/:uuid/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<StatusResponse>> {
    traced("export_status", async move {
        let token = JobToken::parse(&uuid)?;
        let status = state.exports.status(&token).await?;
        Ok(Json(StatusResponse {
            status: status.as_str(),
        }))
    })
    .await
}

/// Download a finished artifact.
///
/// GET {prefix}/export/:uuid
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Response> {
    traced("export_download", async move {
        let token = JobToken::parse(&uuid)?;
        let path = state.exports.artifact(&token).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(nsi_export::ExportError::from)?;
        let len = file
            .metadata()
            .await
            .map_err(nsi_export::ExportError::from)?
            .len();
        tracing::info!(job = %token, bytes = len, "serving export artifact");

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, GEOPACKAGE_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, len)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
            )
            .body(Body::from_stream(ReaderStream::new(file)))
            .map_err(|e| ServerError::internal(e.to_string()))
    })
    .await
}

/// Stream a prebuilt state file from blob storage.
///
/// GET {prefix}/export/state/:file
pub async fn state_file(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<Response> {
    traced("export_state_file", async move {
        let blobs = state
            .blobs
            .as_ref()
            .ok_or_else(|| ServerError::not_found("state downloads are not configured"))?;
        let name = validate_name(&file)?;
        let blob = blobs.get(name).await?;
        tracing::info!(file = name, "serving state file");

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                blob.content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            )
            .header(header::CACHE_CONTROL, "no-store");
        if let Some(len) = blob.content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
        builder
            .body(Body::from_stream(blob.body))
            .map_err(|e| ServerError::internal(e.to_string()))
    })
    .await
}
