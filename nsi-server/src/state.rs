//! Application state management

use crate::blob::{BlobStore, S3BlobStore};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::telemetry::TelemetryConfig;
use nsi_export::{
    ExportOrchestrator, GeoPackageDriver, PostgisDriver, SqliteStatusStore, StatusStore,
    TracingReporter,
};
use nsi_query::StructureStore;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Instant;

/// File name of the export status database inside the temp storage path.
pub const STATUS_DB_FILE: &str = "temp.db";

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Telemetry configuration
    pub telemetry_config: TelemetryConfig,

    /// Structure reads
    pub store: StructureStore,

    /// Background export jobs
    pub exports: ExportOrchestrator,

    /// State file downloads; `None` when no bucket is configured
    pub blobs: Option<Arc<dyn BlobStore>>,

    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create application state from config.
    ///
    /// The database pool connects lazily, so the server starts (and reports
    /// connection failures per request) while PostGIS is unavailable.
    pub async fn new(config: ServerConfig, telemetry_config: TelemetryConfig) -> Result<Self> {
        config.validate().map_err(ServerError::internal)?;

        let temp_dir = config.temp_storage_path();
        tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| {
            ServerError::internal(format!(
                "cannot create temp storage {}: {e}",
                temp_dir.display()
            ))
        })?;
        let status = SqliteStatusStore::open(&temp_dir.join(STATUS_DB_FILE)).await?;

        let blobs = match config.aws_bucket.as_deref().filter(|b| !b.is_empty()) {
            Some(bucket) => {
                let store = S3BlobStore::from_env(bucket, config.aws_prefix.clone()).await;
                tracing::info!(bucket, prefix = ?config.aws_prefix, "state downloads enabled");
                Some(Arc::new(store) as Arc<dyn BlobStore>)
            }
            None => None,
        };

        let pool = connect_pool(&config);
        Self::with_parts(config, telemetry_config, pool, Arc::new(status), blobs)
    }

    /// Assemble state from already-built parts.
    pub fn with_parts(
        config: ServerConfig,
        telemetry_config: TelemetryConfig,
        pool: PgPool,
        status: Arc<dyn StatusStore>,
        blobs: Option<Arc<dyn BlobStore>>,
    ) -> Result<Self> {
        config.validate().map_err(ServerError::internal)?;
        let exports = ExportOrchestrator::new(
            config.export_config(),
            status,
            Arc::new(PostgisDriver::new(pool.clone())),
            Arc::new(GeoPackageDriver),
            Arc::new(TracingReporter),
        )?;

        Ok(Self {
            config,
            telemetry_config,
            store: StructureStore::new(pool),
            exports,
            blobs,
            start_time: Instant::now(),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Lazily connecting pool for the configured database.
pub fn connect_pool(config: &ServerConfig) -> PgPool {
    let mut options = PgConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_user)
        .database(&config.db_name)
        .application_name("nsi-server");
    if let Some(pass) = &config.db_pass {
        options = options.password(pass);
    }
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_lazy_with(options)
}
