//! National Structure Inventory HTTP server
//!
//! Serves structure points, summary statistics and hexbin aggregates from a
//! PostGIS database as GeoJSON, and runs asynchronous GeoPackage exports.
//!
//! # Example
//!
//! ```ignore
//! use nsi_server::{NsiServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = NsiServer::new(config).await.unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod blob;
pub mod config;
pub mod config_file;
pub mod error;
pub mod routes;
pub mod state;
pub mod streaming;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// How long shutdown waits for running exports to record their final status.
const EXPORT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// NSI HTTP server
pub struct NsiServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl NsiServer {
    /// Create a new server with the given configuration
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let telemetry_config = TelemetryConfig::with_server_config(&config);
        let state = Arc::new(AppState::new(config, telemetry_config).await?);
        let router = routes::build_router(state.clone());

        Ok(Self { state, router })
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until ctrl-c, then cancel running exports.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            prefix = %self.state.config.api_prefix,
            temp_storage = %self.state.config.temp_storage_path().display(),
            "NSI server starting"
        );

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        let drained = self.state.exports.shutdown(EXPORT_SHUTDOWN_GRACE).await;
        info!(exports_drained = drained, "NSI server stopped");

        result
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
