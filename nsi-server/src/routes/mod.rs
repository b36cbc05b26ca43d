//! HTTP route handlers and router configuration

mod admin;
mod export;
mod hexbins;
mod stats;
mod structures;

use crate::error::Result;
use crate::state::AppState;
use crate::telemetry::{create_request_span, set_span_error_code};
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// `bbox` / `fips` / `fmt` query parameters shared by the read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub bbox: String,
    #[serde(default)]
    pub fips: String,
    #[serde(default)]
    pub fmt: String,
}

/// Build the API routes (relative to the API prefix).
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/home", get(admin::home))
        // Structure reads
        .route(
            "/structures",
            get(structures::structures).post(structures::structures_in_geometry),
        )
        .route("/structure/:id", get(structures::structure))
        .route("/hexbins/:dataset", get(hexbins::hexbins))
        .route("/stats", get(stats::stats).post(stats::stats_in_geometry))
        // Export jobs
        .route("/export", get(export::create).post(export::create_from_geometry))
        .route("/export/state/:file", get(export::state_file))
        .route("/export/:uuid", get(export::download))
        .route("/export/:uuid/status", get(export::status))
}

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.normalized_prefix();

    let mut router = Router::new()
        // Health check
        .route("/health", get(admin::health))
        .route("/server/stats", get(admin::stats));

    router = if prefix.is_empty() {
        router.merge(api_routes())
    } else {
        router.nest(prefix, api_routes())
    };

    // Add state
    let mut router = router
        .with_state(state.clone())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.body_limit));

    // Add middleware
    router = router.layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Run a handler body inside a request span, recording the error type on failure.
async fn traced<T, F>(operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let span = create_request_span(operation);
    let result = fut.instrument(span.clone()).await;
    if let Err(e) = &result {
        set_span_error_code(&span, e.error_type());
    }
    result
}
