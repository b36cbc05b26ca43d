//! Server error types with HTTP status code mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nsi_export::ExportError;
use nsi_geo::GeoError;
use nsi_query::QueryError;
use serde::Serialize;
use thiserror::Error;

/// Compact error type identifiers returned in `@type`.
pub mod errors {
    pub const INVALID_INPUT: &str = "err:nsi/InvalidInput";
    pub const GEOMETRY: &str = "err:nsi/GeometryError";
    pub const JSON_PARSE: &str = "err:nsi/JsonParse";
    pub const QUERY: &str = "err:nsi/QueryError";
    pub const IO: &str = "err:nsi/IOError";
    pub const NOT_FOUND: &str = "err:nsi/NotFound";
    pub const AT_CAPACITY: &str = "err:nsi/AtCapacity";
    pub const SHUTTING_DOWN: &str = "err:nsi/ShuttingDown";
    pub const BAD_REQUEST: &str = "err:nsi/BadRequest";
    pub const INTERNAL: &str = "err:nsi/Internal";
}

/// Server error type wrapping the library errors and mapping them to HTTP
#[derive(Error, Debug)]
pub enum ServerError {
    /// Query pipeline error
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Export job error
    #[error("{0}")]
    Export(#[from] ExportError),

    /// Geometry error outside a query (e.g. posted GeoJSON)
    #[error("{0}")]
    Geometry(#[from] GeoError),

    /// JSON parsing error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not Found (404)
    #[error("{0}")]
    NotFound(String),

    /// Blob storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Map error to error type IRI (compact form)
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Query(QueryError::InvalidInput(_)) => errors::INVALID_INPUT,
            ServerError::Query(QueryError::Geometry(_)) => errors::GEOMETRY,
            ServerError::Query(QueryError::Database(_)) => errors::QUERY,
            ServerError::Query(QueryError::Io(_)) => errors::IO,
            ServerError::Query(QueryError::Json(_)) => errors::INTERNAL,
            ServerError::Query(QueryError::Sink(_)) => errors::IO,

            ServerError::Export(ExportError::InvalidInput(_)) => errors::INVALID_INPUT,
            ServerError::Export(ExportError::Geometry(_)) => errors::GEOMETRY,
            ServerError::Export(ExportError::NotFound(_)) => errors::NOT_FOUND,
            ServerError::Export(ExportError::AtCapacity { .. }) => errors::AT_CAPACITY,
            ServerError::Export(ExportError::ShuttingDown) => errors::SHUTTING_DOWN,
            ServerError::Export(ExportError::Database(_)) => errors::QUERY,
            ServerError::Export(ExportError::Io(_)) => errors::IO,
            ServerError::Export(ExportError::Json(_)) => errors::INTERNAL,
            ServerError::Export(ExportError::Panicked(_)) => errors::INTERNAL,
            ServerError::Export(ExportError::InvalidTransition { .. }) => errors::INTERNAL,
            ServerError::Export(ExportError::Encoding(_)) => errors::GEOMETRY,

            ServerError::Geometry(_) => errors::GEOMETRY,
            ServerError::Json(_) => errors::JSON_PARSE,
            ServerError::BadRequest(_) => errors::BAD_REQUEST,
            ServerError::NotFound(_) => errors::NOT_FOUND,
            ServerError::Storage(_) => errors::IO,
            ServerError::Internal(_) => errors::INTERNAL,
        }
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 - Bad Request (client errors)
            ServerError::Query(QueryError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServerError::Query(QueryError::Geometry(_)) => StatusCode::BAD_REQUEST,
            ServerError::Export(ExportError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServerError::Export(ExportError::Geometry(_)) => StatusCode::BAD_REQUEST,
            ServerError::Geometry(_) => StatusCode::BAD_REQUEST,
            ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,

            // 404 - Not Found
            ServerError::Export(ExportError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,

            // 503 - retry later
            ServerError::Export(ExportError::AtCapacity { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Export(ExportError::ShuttingDown) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 - Internal Server Error (server-side errors and catch-all)
            ServerError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    /// Create a not found error (404)
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServerError::NotFound(msg.into())
    }

    /// Create an internal error (500)
    pub fn internal(msg: impl Into<String>) -> Self {
        ServerError::Internal(msg.into())
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
    /// Error type (compact IRI, e.g., "err:nsi/InvalidInput")
    #[serde(rename = "@type")]
    pub error_type: String,
    /// Underlying cause, when it adds information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorResponse>>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "request failed");
        } else {
            tracing::debug!(error = %self, error_type, "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
            error_type: error_type.to_string(),
            cause: extract_cause(&self),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","status":{},"@type":"{}"}}"#,
                self,
                status.as_u16(),
                error_type
            )
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Surface the database error under query/export failures.
fn extract_cause(error: &ServerError) -> Option<Box<ErrorResponse>> {
    let db_err = match error {
        ServerError::Query(QueryError::Database(e)) => e,
        ServerError::Export(ExportError::Database(e)) => e,
        _ => return None,
    };
    let db = db_err.as_database_error()?;
    Some(Box::new(ErrorResponse {
        error: db.message().to_string(),
        status: 500,
        error_type: errors::QUERY.to_string(),
        cause: None,
    }))
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
