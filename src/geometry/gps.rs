// src/geometry/gps.rs
// Geodetic coordinates and their WGS84 Earth-Centered-Earth-Fixed position.

use serde::{Deserialize, Serialize};
use std::fmt;

/// WGS84 semi-major axis (m).
const SEMI_MAJOR: f64 = 6378137.0;
/// WGS84 semi-minor axis (m).
const SEMI_MINOR: f64 = 6356752.3142;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsCoords {
    /// Degrees, -90..=90.
    pub latitude: f64,
    /// Degrees, -180..=180.
    pub longitude: f64,
    /// Meters above the ellipsoid.
    pub altitude: f64,
}

impl GpsCoords {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        GpsCoords {
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn to_ecef(&self) -> [f64; 3] {
        to_ecef(self.latitude, self.longitude, self.altitude)
    }
}

impl fmt::Display for GpsCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.latitude, self.longitude, self.altitude)
    }
}

/// Converts latitude/longitude in degrees and altitude in meters to ECEF
/// `[x, y, z]` meters.
pub fn to_ecef(latitude: f64, longitude: f64, altitude: f64) -> [f64; 3] {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();

    let f = (SEMI_MAJOR - SEMI_MINOR) / SEMI_MAJOR;
    let e_sq = 2.0 * f - f * f;

    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let nu = SEMI_MAJOR / (1.0 - e_sq * sin_lat * sin_lat).sqrt();

    [
        (nu + altitude) * cos_lat * cos_lon,
        (nu + altitude) * cos_lat * sin_lon,
        (nu * (1.0 - e_sq) + altitude) * sin_lat,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_equator_prime_meridian() {
        let [x, y, z] = to_ecef(0.0, 0.0, 0.0);
        assert_approx_eq!(x, 6378137.0, 1e-6);
        assert_approx_eq!(y, 0.0, 1e-6);
        assert_approx_eq!(z, 0.0, 1e-6);
    }

    #[test]
    fn test_north_pole() {
        let [x, y, z] = GpsCoords::new(90.0, 0.0, 0.0).to_ecef();
        assert_approx_eq!(x, 0.0, 1e-6);
        assert_approx_eq!(y, 0.0, 1e-6);
        assert_approx_eq!(z, 6356752.3142, 1e-3);
    }

    #[test]
    fn test_altitude_and_longitude() {
        let [x, y, z] = to_ecef(0.0, 90.0, 100.0);
        assert_approx_eq!(x, 0.0, 1e-6);
        assert_approx_eq!(y, 6378237.0, 1e-6);
        assert_approx_eq!(z, 0.0, 1e-6);
    }

    #[test]
    fn test_display_and_validity() {
        let c = GpsCoords::new(45.5, -73.25, 12.0);
        assert_eq!(c.to_string(), "45.5, -73.25, 12");
        assert!(c.is_valid());
        assert!(!GpsCoords::new(91.0, 0.0, 0.0).is_valid());
    }
}
