//! Coordinate reference systems known to the service.

use crate::error::{GeoError, Result};
use std::fmt;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic longitude/latitude on WGS84 (EPSG:4326).
    Wgs84,
    /// Spherical Web Mercator in meters (EPSG:3857).
    WebMercator,
}

impl Crs {
    /// EPSG identifier, used as the SRID tag in SQL literals.
    pub fn epsg(self) -> i32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
        }
    }

    /// Resolve an EPSG identifier.
    pub fn from_epsg(code: i32) -> Result<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            3857 | 900913 => Ok(Crs::WebMercator),
            other => Err(GeoError::UnsupportedCrs(other)),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsg_roundtrip() {
        assert_eq!(Crs::from_epsg(4326).unwrap(), Crs::Wgs84);
        assert_eq!(Crs::from_epsg(3857).unwrap(), Crs::WebMercator);
        assert_eq!(Crs::WebMercator.epsg(), 3857);
        assert_eq!(Crs::Wgs84.to_string(), "EPSG:4326");
    }

    #[test]
    fn test_unknown_epsg() {
        assert!(matches!(
            Crs::from_epsg(2154),
            Err(GeoError::UnsupportedCrs(2154))
        ));
    }
}
