//! Geometry support for the structure inventory service.
//!
//! Point and polygon geometries live in two coordinate systems: the geographic
//! WGS84 system used by API clients and the spherical Web Mercator system the
//! hexbin aggregates are stored in. This crate converts between them and
//! handles the text encodings used at the database and HTTP edges.
//!
//! # Modules
//!
//! - [`crs`]: supported coordinate reference systems
//! - [`project`]: reprojection between WGS84 and Web Mercator
//! - [`geometry`]: WKT parsing/serialization, ring assembly, validation
//! - [`geojson`]: GeoJSON geometry reading and writing
//! - [`error`]: error types

pub mod crs;
pub mod error;
pub mod geojson;
pub mod geometry;
pub mod project;

pub use crs::Crs;
pub use error::{GeoError, Result};
pub use geometry::{parse_wkt, polygon_from_pairs, to_wkt, validate};
pub use project::reproject;

pub use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
