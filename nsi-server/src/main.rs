//! NSI server CLI
//!
//! Run with: `cargo run -p nsi-server -- --help`

use clap::{CommandFactory, FromArgMatches};
use nsi_server::{
    config_file::load_and_merge_config,
    telemetry::{init_logging, TelemetryConfig},
    NsiServer, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Parse CLI + env via clap (get both typed config and raw matches)
    let matches = ServerConfig::command().get_matches();
    let mut config = ServerConfig::from_arg_matches(&matches)?;

    // 2. Load config file and merge (file values apply only where CLI/env didn't set a value)
    if let Err(e) = load_and_merge_config(&mut config, &matches) {
        eprintln!("Warning: {e}");
    }

    let telemetry_config = TelemetryConfig::with_server_config(&config);
    init_logging(&telemetry_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        prefix = %config.api_prefix,
        db_host = %config.db_host,
        db_name = %config.db_name,
        cors = config.cors_enabled,
        export_max_concurrent = config.export_max_concurrent,
        export_track_failures = config.export_track_failures,
        blob_storage = config.blob_storage_enabled(),
        log_format = ?telemetry_config.log_format,
        "Starting NSI server"
    );

    let server = NsiServer::new(config).await?;
    server.run().await.map_err(Into::into)
}
