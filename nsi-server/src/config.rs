//! Server configuration

use crate::telemetry::LogFormat;
use clap::Parser;
use nsi_export::ExportConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3031);

/// Structure inventory HTTP server configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "nsi-server")]
#[command(about = "National Structure Inventory HTTP API server")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "NSI_LISTEN_ADDR", default_value = "0.0.0.0:3031")]
    pub listen_addr: SocketAddr,

    /// Path prefix all API routes are nested under
    #[arg(long, env = "NSI_API_PREFIX", default_value = "/nsiapi")]
    pub api_prefix: String,

    /// PostGIS host
    #[arg(long, env = "NSI_DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// PostGIS port
    #[arg(long, env = "NSI_DB_PORT", default_value = "5432")]
    pub db_port: u16,

    /// PostGIS user
    #[arg(long, env = "NSI_DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// PostGIS password
    #[arg(long, env = "NSI_DB_PASS", hide_env_values = true)]
    pub db_pass: Option<String>,

    /// PostGIS database name
    #[arg(long, env = "NSI_DB_NAME", default_value = "nsi")]
    pub db_name: String,

    /// Maximum pooled database connections
    #[arg(long, env = "NSI_DB_MAX_CONNECTIONS", default_value = "10")]
    pub db_max_connections: u32,

    /// Directory for export artifacts and the export status database
    /// (default: `<system temp>/nsi`)
    #[arg(long, env = "NSI_TEMP_STORAGE_PATH")]
    pub temp_storage_path: Option<PathBuf>,

    /// Enable CORS (Cross-Origin Resource Sharing)
    #[arg(long, env = "NSI_CORS_ENABLED", default_value = "true")]
    pub cors_enabled: bool,

    /// Request body size limit in bytes (default 50MB)
    #[arg(long, env = "NSI_BODY_LIMIT", default_value = "52428800")]
    pub body_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NSI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "NSI_LOG_FORMAT", value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,

    /// Maximum number of exports running at once
    #[arg(long, env = "NSI_EXPORT_MAX_CONCURRENT", default_value = "8")]
    pub export_max_concurrent: usize,

    /// Report export progress every N features
    #[arg(long, env = "NSI_EXPORT_REPORT_INTERVAL", default_value = "10000")]
    pub export_report_interval: u64,

    /// Record failed exports as `Failed` instead of `Completed`
    #[arg(long, env = "NSI_EXPORT_TRACK_FAILURES", default_value = "false")]
    pub export_track_failures: bool,

    /// S3 bucket holding downloadable state files
    #[arg(long, env = "NSI_AWS_BUCKET")]
    pub aws_bucket: Option<String>,

    /// Key prefix of state files within the bucket
    #[arg(long, env = "NSI_AWS_PREFIX")]
    pub aws_prefix: Option<String>,

    /// Config file (TOML, or JSON by extension); defaults to `./nsi.toml` when present
    #[arg(long = "config", env = "NSI_CONFIG")]
    pub config_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(DEFAULT_LISTEN_ADDR),
            api_prefix: "/nsiapi".to_string(),
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_user: "postgres".to_string(),
            db_pass: None,
            db_name: "nsi".to_string(),
            db_max_connections: 10,
            temp_storage_path: None,
            cors_enabled: true,
            body_limit: 50 * 1024 * 1024, // 50MB
            log_level: "info".to_string(),
            log_format: LogFormat::Human,
            export_max_concurrent: 8,
            export_report_interval: 10_000,
            export_track_failures: false,
            aws_bucket: None,
            aws_prefix: None,
            config_file: None,
        }
    }
}

impl ServerConfig {
    /// Create config from CLI args
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Directory holding export artifacts and `temp.db`.
    pub fn temp_storage_path(&self) -> PathBuf {
        self.temp_storage_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("nsi"))
    }

    /// API prefix without a trailing slash; empty when routes sit at the root.
    pub fn normalized_prefix(&self) -> &str {
        self.api_prefix.trim_end_matches('/')
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            output_dir: self.temp_storage_path(),
            max_concurrent: self.export_max_concurrent,
            report_every: self.export_report_interval,
            track_failures: self.export_track_failures,
        }
    }

    /// Whether state file downloads are backed by S3.
    pub fn blob_storage_enabled(&self) -> bool {
        self.aws_bucket.as_deref().is_some_and(|b| !b.is_empty())
    }

    /// Validate all configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_prefix.starts_with('/') {
            return Err(format!(
                "api_prefix must start with '/' (got '{}')",
                self.api_prefix
            ));
        }
        if self.export_max_concurrent == 0 {
            return Err("export_max_concurrent must be > 0".to_string());
        }
        if self.export_report_interval == 0 {
            return Err("export_report_interval must be > 0".to_string());
        }
        if self.db_max_connections == 0 {
            return Err("db_max_connections must be > 0".to_string());
        }
        Ok(())
    }
}
