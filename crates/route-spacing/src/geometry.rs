//! Geodesy helpers: great-circle distance and point-to-segment projection.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within latitude/longitude bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self, other)
    }
}

/// Haversine distance between two points in kilometres.
#[must_use]
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Fraction along `start → end` of the point closest to `point`, clamped to
/// `[0, 1]`.
///
/// Works in a local equirectangular plane scaled by the segment's mean
/// latitude, which is accurate at route-segment lengths.
#[must_use]
pub fn segment_fraction(point: &Coordinate, start: &Coordinate, end: &Coordinate) -> f64 {
    let scale = ((start.lat + end.lat) / 2.0).to_radians().cos();
    let (ax, ay) = (start.lng * scale, start.lat);
    let (dx, dy) = (end.lng.mul_add(scale, -ax), end.lat - ay);
    let (px, py) = (point.lng.mul_add(scale, -ax), point.lat - ay);

    let length_sq = dx.mul_add(dx, dy * dy);
    if length_sq <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    (px.mul_add(dx, py * dy) / length_sq).clamp(0.0, 1.0)
}

/// Point at `fraction` along `start → end`.
#[must_use]
pub fn interpolate(start: &Coordinate, end: &Coordinate, fraction: f64) -> Coordinate {
    Coordinate::new(
        (end.lat - start.lat).mul_add(fraction, start.lat),
        (end.lng - start.lng).mul_add(fraction, start.lng),
    )
}
