//! Error types for export jobs.

use nsi_geo::GeoError;
use thiserror::Error;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Malformed request (no filter, bad geometry payload).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed or untransformable geometry.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeoError),

    /// Geometry could not be encoded for the output file.
    #[error("Geometry encoding error: {0}")]
    Encoding(#[from] geozero::error::GeozeroError),

    /// Database or driver failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Attribute payload could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown job token or missing artifact.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A status write that would move a job backwards or skip a state.
    #[error("Invalid status transition for {guid}: {from} -> {to}")]
    InvalidTransition {
        guid: String,
        from: String,
        to: String,
    },

    /// Concurrency limit reached; the job was not accepted.
    #[error("Export capacity reached ({limit} jobs running), retry later")]
    AtCapacity { limit: usize },

    /// The orchestrator is shutting down.
    #[error("Export cancelled by shutdown")]
    ShuttingDown,

    /// A worker panicked; caught by the job's recovery barrier.
    #[error("Export worker panicked: {0}")]
    Panicked(String),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
