use geo::{Bearing, Distance, Haversine};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::meters::Meters;

/// A WGS84 position, longitude first like GeoJSON.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    pub fn haversine_distance(&self, to: &Coordinate) -> Meters {
        Meters::new(Haversine.distance(geo::Point::from(self), geo::Point::from(to)))
    }

    /// Forward azimuth towards `dest`, in degrees clockwise from north within [0, 360).
    pub fn bearing(&self, dest: &Coordinate) -> f64 {
        let bearing = Haversine.bearing(geo::Point::from(self), geo::Point::from(dest));
        normalize_bearing(bearing)
    }
}

pub fn normalize_bearing(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }

    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 { 0.0 } else { normalized }
}

impl From<&Coordinate> for geo::Point<f64> {
    fn from(coordinate: &Coordinate) -> Self {
        geo::Point::new(coordinate.lon, coordinate.lat)
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(coordinate: Coordinate) -> Self {
        geo::Point::new(coordinate.lon, coordinate.lat)
    }
}

impl From<&Coordinate> for geo::Coord<f64> {
    fn from(coordinate: &Coordinate) -> Self {
        geo::Coord {
            x: coordinate.lon,
            y: coordinate.lat,
        }
    }
}

impl From<geo::Point<f64>> for Coordinate {
    fn from(point: geo::Point<f64>) -> Self {
        Coordinate::new(point.x(), point.y())
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(value: [f64; 2]) -> Self {
        Coordinate::new(value[0], value[1])
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lon, self.lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance_los_angeles_san_francisco() {
        let los_angeles = Coordinate::new(-118.2437, 34.0522);
        let san_francisco = Coordinate::new(-122.4194, 37.7749);

        let distance = los_angeles.haversine_distance(&san_francisco).value();

        assert!((distance - 559_000.0).abs() < 3_000.0, "{distance}");
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);

        assert!((origin.bearing(&Coordinate::new(0.0, 1.0)) - 0.0).abs() < 1e-6);
        assert!((origin.bearing(&Coordinate::new(1.0, 0.0)) - 90.0).abs() < 1e-6);
        assert!((origin.bearing(&Coordinate::new(0.0, -1.0)) - 180.0).abs() < 1e-6);
        assert!((origin.bearing(&Coordinate::new(-1.0, 0.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(725.0), 5.0);
        assert_eq!(normalize_bearing(f64::NAN), 0.0);
    }

    #[test]
    fn test_validity() {
        assert!(Coordinate::new(-122.4194, 37.7749).is_valid());
        assert!(!Coordinate::new(-190.0, 37.7749).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }
}
