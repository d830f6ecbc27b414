use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject non-finite or out-of-range coordinates before they reach the distance math.
    pub fn validate(&self) -> AppResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(AppError::Validation(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(AppError::Validation(format!(
                "Latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::Validation(format!(
                "Longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }

    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Great-circle distance in kilometers using the Haversine formula.
/// NaN inputs propagate as NaN.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Clamp guards asin against a drifting a few ulps above 1 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero() {
        for (lat, lng) in [(0.0, 0.0), (-6.2088, 106.8456), (51.5074, -0.1278), (89.9, 179.9)] {
            assert_eq!(distance_km(lat, lng, lat, lng), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            ((0.0, 0.0), (0.0, 1.0)),
            ((-6.2088, 106.8456), (-6.9175, 107.6191)),
            ((40.7128, -74.0060), (34.0522, -118.2437)),
            ((-33.8688, 151.2093), (35.6762, 139.6503)),
        ];

        for ((lat1, lng1), (lat2, lng2)) in pairs {
            let forward = distance_km(lat1, lng1, lat2, lng2);
            let backward = distance_km(lat2, lng2, lat1, lng1);
            assert!((forward - backward).abs() < 1e-9);
        }
    }

    #[test]
    fn test_one_degree_of_longitude_on_equator() {
        let distance = distance_km(0.0, 0.0, 0.0, 1.0);
        assert!((distance - 111.19).abs() < 0.01);
    }

    #[test]
    fn test_antipodal_points() {
        let distance = distance_km(0.0, 0.0, 0.0, 180.0);
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((distance - half_circumference).abs() < 1e-6);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_km(f64::NAN, 0.0, 0.0, 1.0).is_nan());
    }

    #[test]
    fn test_validate_rejects_bad_coordinates() {
        assert!(Coordinates::new(0.0, 0.0).validate().is_ok());
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).validate().is_err());
        assert!(Coordinates::new(91.0, 0.0).validate().is_err());
        assert!(Coordinates::new(0.0, -180.5).validate().is_err());
    }
}
