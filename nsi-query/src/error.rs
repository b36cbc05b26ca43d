//! Error types for query compilation and encoding.

use nsi_geo::GeoError;
use thiserror::Error;

/// Query pipeline errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed bbox, fips, format or dataset key. Raised before any query runs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed or untransformable geometry.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeoError),

    /// Database or driver failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File or storage failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The output sink stopped accepting data (client went away).
    #[error("Output closed: {0}")]
    Sink(String),
}

impl QueryError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        QueryError::InvalidInput(msg.into())
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
