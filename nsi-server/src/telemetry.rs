//! Logging setup
//!
//! Filter precedence: `RUST_LOG`, then `LOG_LEVEL`, then the configured
//! `log_level`. Output format: `LOG_FORMAT`, then the configured `log_format`.

use crate::config::ServerConfig;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line text
    #[default]
    Human,
    /// One JSON object per event, fields nested under `fields`
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Json => "json",
        })
    }
}

impl LogFormat {
    /// `LOG_FORMAT` overrides the configured format; unknown values keep it.
    fn resolve(env_value: Option<&str>, configured: LogFormat) -> LogFormat {
        env_value
            .and_then(|v| <LogFormat as ValueEnum>::from_str(v.trim(), true).ok())
            .unwrap_or(configured)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    /// Resolve the logging setup for a server, applying env overrides.
    pub fn with_server_config(server_config: &ServerConfig) -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| server_config.log_level.clone()),
            log_format: LogFormat::resolve(
                env::var("LOG_FORMAT").ok().as_deref(),
                server_config.log_format,
            ),
        }
    }

    /// The filter directive that will be installed.
    pub fn effective_filter(&self) -> &str {
        if self.log_filter.is_empty() {
            &self.default_level
        } else {
            &self.log_filter
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::with_server_config(&ServerConfig::default())
    }
}

/// Formatting layer for `format`, writing to `writer`.
pub fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    match format {
        LogFormat::Human => layer.compact().boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
    }
}

/// Initialize logging
///
/// Safe to call multiple times - will only initialize once.
pub fn init_logging(config: &TelemetryConfig) {
    // A global subscriber may already be set (e.g., from tests)
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let filter = EnvFilter::new(config.effective_filter());

    // try_init: another thread may have won the race since has_been_set()
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config.log_format, std::io::stderr))
        .try_init();
}

/// Span wrapping one request handler.
pub fn create_request_span(operation: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        operation = operation,
        error_code = tracing::field::Empty,
    )
}

/// Record the error code of a failed request on its span.
pub fn set_span_error_code(span: &tracing::Span, error_code: &str) {
    span.record("error_code", error_code);
}
