//! Admin endpoints: /health, /server/stats, {prefix}/home

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Banner returned by the API home route.
pub const HOME_BANNER: &str = "National Structures Inventory APIv2";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET {prefix}/home
pub async fn home() -> &'static str {
    HOME_BANNER
}

/// Server statistics response
#[derive(Serialize)]
pub struct StatsResponse {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Exports currently holding a worker slot
    pub running_exports: usize,
    /// Export worker slots
    pub max_concurrent_exports: usize,
    /// Geometry filters owned by live export jobs
    pub geometry_filters_in_use: u64,
    /// Whether state downloads are served from blob storage
    pub blob_storage: bool,
    /// Server version
    pub version: &'static str,
}

/// Server statistics endpoint
///
/// GET /server/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let span = tracing::info_span!("server_stats");
    let _guard = span.enter();

    tracing::info!("server stats requested");

    Json(StatsResponse {
        uptime_secs: state.uptime_secs(),
        running_exports: state.exports.running_jobs(),
        max_concurrent_exports: state.exports.max_concurrent(),
        geometry_filters_in_use: nsi_export::geometry_filters_in_use(),
        blob_storage: state.blobs.is_some(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
