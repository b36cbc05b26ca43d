//! Query pipeline for the structure inventory service.
//!
//! User filters are compiled into parameterized predicates ([`criteria`]),
//! executed against PostGIS ([`store`]), and streamed out row by row as
//! GeoJSON ([`encoder`]). Hexbin aggregates ([`hexbin`]) share the encoder
//! after reprojecting their cell polygons to WGS84.
//!
//! # Modules
//!
//! - [`criteria`]: bbox/fips compilation and clause assembly
//! - [`record`]: structure rows and static output field tables
//! - [`summary`]: aggregate statistics rows
//! - [`hexbin`]: hexbin dataset allow-list and cell rows
//! - [`encoder`]: `fc`/`fa`/`fs` streaming encoder
//! - [`store`]: PostGIS reads
//! - [`error`]: error types

pub mod criteria;
pub mod encoder;
pub mod error;
pub mod hexbin;
pub mod record;
pub mod store;
pub mod summary;

pub use criteria::{build_criteria, compile_bbox, compile_fips, Criteria};
pub use encoder::{encode, write_feature, FeatureRecord, FeatureSink, OutputFormat};
pub use error::{QueryError, Result};
pub use hexbin::{resolve_dataset, HexbinRow, HEXBIN_DATASETS};
pub use record::{StructureRecord, STRUCTURE_FIELDS, STRUCTURE_SELECT};
pub use store::StructureStore;
pub use summary::StructureSummary;
