//! Asynchronous GeoPackage export jobs.
//!
//! An [`ExportOrchestrator`] accepts an [`ExportSpec`] (SQL, parameters and an
//! optional owned [`GeometryFilter`]), records its status in a
//! [`StatusStore`] and copies the query result into a GeoPackage point layer
//! on a background task.
//!
//! Sources and outputs sit behind the [`gis`] traits: [`PostgisDriver`] reads
//! the structure database, [`GeoPackageDriver`] writes the artifact.

pub mod error;
pub mod gis;
pub mod gpkg;
pub mod job;
pub mod orchestrator;
pub mod postgis;
pub mod progress;
pub mod status;

pub use error::{ExportError, Result};
pub use gpkg::GeoPackageDriver;
pub use job::{
    geometry_filters_in_use, ExportSpec, GeometryFilter, JobToken, DEFAULT_LAYER_NAME,
};
pub use orchestrator::{ExportConfig, ExportOrchestrator};
pub use postgis::PostgisDriver;
pub use progress::{ProgressReporter, TracingReporter};
pub use status::{JobStatus, MemoryStatusStore, SqliteStatusStore, StatusStore};
