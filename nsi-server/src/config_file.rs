//! Configuration file support.
//!
//! Loads server settings from a TOML (or JSON) file and merges them into the
//! parsed [`ServerConfig`]. Settings live under a `[server]` section.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Config file (`[server]`)
//! 4. Hardcoded defaults

use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::telemetry::LogFormat;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "nsi.toml";

/// Top-level config file structure. Unknown sections are tolerated.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NsiFileConfig {
    /// Server configuration section `[server]`
    #[serde(default)]
    pub server: Option<ServerFileConfig>,
}

/// The `[server]` section. Every field is `Option` so the file only needs to
/// contain values the user wants to set.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ServerFileConfig {
    pub listen_addr: Option<String>,
    pub api_prefix: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub cors_enabled: Option<bool>,
    pub body_limit: Option<usize>,
    pub temp_storage_path: Option<String>,

    /// `[server.database]`
    #[serde(default)]
    pub database: Option<DatabaseFileConfig>,

    /// `[server.export]`
    #[serde(default)]
    pub export: Option<ExportFileConfig>,

    /// `[server.aws]`
    #[serde(default)]
    pub aws: Option<AwsFileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct DatabaseFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub name: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ExportFileConfig {
    pub max_concurrent: Option<usize>,
    pub report_interval: Option<u64>,
    pub track_failures: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct AwsFileConfig {
    pub bucket: Option<String>,
    pub prefix: Option<String>,
}

/// Load a config file from the given path. Detects format by extension:
/// `.json` → JSON, everything else → TOML.
pub fn load_config(path: &Path) -> Result<NsiFileConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.trim().is_empty() {
        return Ok(NsiFileConfig::default());
    }

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    } else {
        toml::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

/// Errors from config file loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Resolve the config file path.
///
/// An explicit `--config` path must exist. Without one, `./nsi.toml` is used
/// when present; otherwise there is no file config.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigFileError> {
    if let Some(p) = explicit {
        if p.is_file() {
            return Ok(Some(p.to_path_buf()));
        }
        return Err(ConfigFileError::NotFound(p.to_path_buf()));
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(local.is_file().then_some(local))
}

/// All clap arg IDs referenced by `apply_to_server_config`.
///
/// This list is validated by `test_config_file_arg_ids_match_server_config`
/// to ensure every ID actually exists in `ServerConfig`'s clap definition.
pub const CONFIG_FILE_ARG_IDS: &[&str] = &[
    "listen_addr",
    "api_prefix",
    "log_level",
    "log_format",
    "cors_enabled",
    "body_limit",
    "temp_storage_path",
    "db_host",
    "db_port",
    "db_user",
    "db_pass",
    "db_name",
    "db_max_connections",
    "export_max_concurrent",
    "export_report_interval",
    "export_track_failures",
    "aws_bucket",
    "aws_prefix",
];

/// Apply config file values to a `ServerConfig`, but only for fields where
/// the user did NOT provide a CLI argument or environment variable.
pub fn apply_to_server_config(
    file: &ServerFileConfig,
    config: &mut ServerConfig,
    matches: &ArgMatches,
) {
    use clap::parser::ValueSource;

    // Field is using its default (or is unset) rather than CLI/env input.
    let is_default = |arg_name: &str| -> bool {
        matches!(
            matches.value_source(arg_name),
            None | Some(ValueSource::DefaultValue)
        )
    };

    macro_rules! apply {
        ($id:literal, $src:expr => $dst:expr) => {
            if is_default($id) {
                if let Some(v) = $src.clone() {
                    $dst = v;
                }
            }
        };
    }

    // NOTE: clap derive uses the field name (underscores) as the arg ID.
    if is_default("listen_addr") {
        if let Some(ref addr_str) = file.listen_addr {
            match addr_str.parse::<SocketAddr>() {
                Ok(addr) => config.listen_addr = addr,
                Err(_) => warn!(
                    value = %addr_str,
                    "Invalid listen_addr in config file, ignoring"
                ),
            }
        }
    }
    if is_default("api_prefix") {
        if let Some(ref prefix) = file.api_prefix {
            if prefix.starts_with('/') {
                config.api_prefix = prefix.clone();
            } else {
                warn!(value = %prefix, "Invalid api_prefix in config file, ignoring");
            }
        }
    }
    apply!("log_level", file.log_level => config.log_level);
    apply!("log_format", file.log_format => config.log_format);
    apply!("cors_enabled", file.cors_enabled => config.cors_enabled);
    apply!("body_limit", file.body_limit => config.body_limit);
    if is_default("temp_storage_path") {
        if let Some(ref path) = file.temp_storage_path {
            config.temp_storage_path = Some(PathBuf::from(path));
        }
    }

    if let Some(ref db) = file.database {
        apply!("db_host", db.host => config.db_host);
        apply!("db_port", db.port => config.db_port);
        apply!("db_user", db.user => config.db_user);
        if is_default("db_pass") && db.pass.is_some() {
            config.db_pass = db.pass.clone();
        }
        apply!("db_name", db.name => config.db_name);
        apply!("db_max_connections", db.max_connections => config.db_max_connections);
    }

    if let Some(ref export) = file.export {
        apply!("export_max_concurrent", export.max_concurrent => config.export_max_concurrent);
        apply!("export_report_interval", export.report_interval => config.export_report_interval);
        apply!("export_track_failures", export.track_failures => config.export_track_failures);
    }

    if let Some(ref aws) = file.aws {
        if is_default("aws_bucket") && aws.bucket.is_some() {
            config.aws_bucket = aws.bucket.clone();
        }
        if is_default("aws_prefix") && aws.prefix.is_some() {
            config.aws_prefix = aws.prefix.clone();
        }
    }
}

/// Resolve, load and merge the config file into `config`.
pub fn load_and_merge_config(
    config: &mut ServerConfig,
    matches: &ArgMatches,
) -> Result<(), ConfigFileError> {
    let Some(path) = resolve_config_path(config.config_file.as_deref())? else {
        debug!("No config file found, using CLI args and defaults only");
        return Ok(());
    };

    info!(path = %path.display(), "Loading configuration file");

    let file_config = load_config(&path)?;
    let server_section = file_config.server.unwrap_or_default();
    apply_to_server_config(&server_section, config, matches);

    Ok(())
}
