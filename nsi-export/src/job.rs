//! Export job identity and specification.

use crate::error::{ExportError, Result};
use nsi_geo::{geometry, Geometry};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Output layer name of every export.
pub const DEFAULT_LAYER_NAME: &str = "nsi_export";

/// Artifact file extension.
pub const ARTIFACT_EXTENSION: &str = "gpkg";

/// Geometry filters currently alive (acquired and not yet released).
static FILTERS_IN_USE: AtomicU64 = AtomicU64::new(0);

/// Number of geometry filters currently held by jobs.
pub fn geometry_filters_in_use() -> u64 {
    FILTERS_IN_USE.load(Ordering::Relaxed)
}

/// Unique identifier of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobToken(Uuid);

impl JobToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a caller-supplied token.
    ///
    /// Anything that is not a UUID cannot name a job, so it is reported as
    /// not found. A parsed token only ever renders as hex digits and hyphens,
    /// which is what makes it safe to embed in a file name.
    pub fn parse(raw: &str) -> Result<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| ExportError::NotFound(format!("export {raw}")))
    }

    /// File name of this job's artifact.
    pub fn artifact_name(&self) -> String {
        format!("{}.{}", self.0, ARTIFACT_EXTENSION)
    }
}

impl Default for JobToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A WGS84 geometry restricting an export, owned by exactly one job.
///
/// Released when dropped, whichever way the job ends.
#[derive(Debug)]
pub struct GeometryFilter {
    geometry: Geometry<f64>,
    wkt: String,
}

impl GeometryFilter {
    pub fn new(geometry: Geometry<f64>) -> Result<Self> {
        geometry::validate(&geometry)?;
        let wkt = geometry::to_wkt(&geometry);
        FILTERS_IN_USE.fetch_add(1, Ordering::Relaxed);
        Ok(Self { geometry, wkt })
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    /// WKT form, bound as a query parameter.
    pub fn wkt(&self) -> &str {
        &self.wkt
    }
}

impl Drop for GeometryFilter {
    fn drop(&mut self) {
        FILTERS_IN_USE.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(bytes = self.wkt.len(), "geometry filter released");
    }
}

/// Everything a worker needs to run one export.
#[derive(Debug)]
pub struct ExportSpec {
    /// Source query; `$n` placeholders bind `params` in order.
    pub sql: String,
    pub params: Vec<String>,
    pub geometry_filter: Option<GeometryFilter>,
    pub layer_name: String,
}

impl ExportSpec {
    pub fn new(sql: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
            geometry_filter: None,
            layer_name: DEFAULT_LAYER_NAME.to_string(),
        }
    }

    pub fn with_geometry_filter(mut self, filter: GeometryFilter) -> Self {
        self.geometry_filter = Some(filter);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsi_geo::{LineString, Polygon};

    #[test]
    fn test_token_roundtrip() {
        let token = JobToken::new();
        let text = token.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(JobToken::parse(&text).unwrap(), token);
        assert_eq!(token.artifact_name(), format!("{text}.gpkg"));
    }

    #[test]
    fn test_token_rejects_traversal() {
        for raw in ["../../etc/passwd", "", "abc", "..%2F..%2Ftemp.db"] {
            assert!(matches!(
                JobToken::parse(raw),
                Err(ExportError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_filter_rejects_degenerate_polygon() {
        let ring = LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let geom = Geometry::Polygon(Polygon::new(ring, vec![]));
        assert!(matches!(
            GeometryFilter::new(geom),
            Err(ExportError::Geometry(_))
        ));
    }

    #[test]
    fn test_spec_defaults() {
        let spec = ExportSpec::new("SELECT * FROM nsi", vec![]);
        assert_eq!(spec.layer_name, "nsi_export");
        assert!(spec.geometry_filter.is_none());
    }
}
