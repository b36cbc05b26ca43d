//! Error types for geometry handling.

use thiserror::Error;

/// Geometry errors.
#[derive(Error, Debug)]
pub enum GeoError {
    /// WKT parsing error.
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// Malformed or untransformable geometry.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// EPSG code outside the supported set.
    #[error("Unsupported coordinate reference system: EPSG:{0}")]
    UnsupportedCrs(i32),

    /// GeoJSON payload could not be interpreted as a geometry.
    #[error("GeoJSON error: {0}")]
    GeoJson(String),
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeoError>;
