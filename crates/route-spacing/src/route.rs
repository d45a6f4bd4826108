//! Route geometry: normalized path, cumulative lengths and projection.

use realtime::RouteDetails;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{self, Coordinate};
use crate::polyline;

/// Where a route's geometry came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    Polyline,
    Waypoints,
    /// Fewer than two usable points; vehicles are ordered by latitude.
    #[default]
    Unavailable,
}

/// A vehicle position projected onto the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Index of the matched segment.
    pub segment: usize,
    /// Position along the matched segment, in `[0, 1]`.
    pub fraction: f64,
    /// Projected point on the route.
    pub point: Coordinate,
    /// Distance from route start to the projected point.
    pub progress_km: f64,
    /// Distance from the vehicle to the projected point.
    pub off_route_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteGeometry {
    points: Vec<Coordinate>,
    // cumulative_km[i] is the distance from the start to points[i]
    cumulative_km: Vec<f64>,
    source: GeometrySource,
}

impl RouteGeometry {
    /// Builds geometry from the route's encoded polyline, falling back to its
    /// waypoints, and finally to no geometry at all.
    #[must_use]
    pub fn from_route(route: &RouteDetails) -> Self {
        if let Some(encoded) = route.polyline.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match polyline::decode(encoded) {
                Ok(points) => {
                    let geometry = Self::from_points(points, GeometrySource::Polyline);
                    if geometry.is_usable() {
                        return geometry;
                    }
                    debug!(route_id = %route.id, "polyline has fewer than two points");
                }
                Err(err) => {
                    warn!(route_id = %route.id, error = %err, "malformed route polyline, using waypoints");
                }
            }
        }

        let waypoints = route.waypoints.iter().map(|wp| Coordinate::new(wp.lat, wp.lng)).collect();
        let geometry = Self::from_points(waypoints, GeometrySource::Waypoints);
        if geometry.is_usable() {
            return geometry;
        }

        debug!(route_id = %route.id, "no usable route geometry, ordering by latitude");
        Self::unavailable()
    }

    /// Builds geometry from ordered points, dropping invalid coordinates.
    /// With fewer than two valid points the geometry is unavailable.
    #[must_use]
    pub fn from_points(points: Vec<Coordinate>, source: GeometrySource) -> Self {
        let points: Vec<Coordinate> = points.into_iter().filter(Coordinate::is_valid).collect();
        if points.len() < 2 {
            return Self::unavailable();
        }

        let mut cumulative_km = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative_km.push(total);
        for pair in points.windows(2) {
            total += geometry::haversine_km(&pair[0], &pair[1]);
            cumulative_km.push(total);
        }

        Self { points, cumulative_km, source }
    }

    #[must_use]
    pub const fn unavailable() -> Self {
        Self { points: Vec::new(), cumulative_km: Vec::new(), source: GeometrySource::Unavailable }
    }

    #[must_use]
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    #[must_use]
    pub const fn source(&self) -> GeometrySource {
        self.source
    }

    /// Whether route-relative projection is available.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.points.len() >= 2
    }

    /// Total route length, when geometry is usable.
    #[must_use]
    pub fn length_km(&self) -> Option<f64> {
        if !self.is_usable() {
            return None;
        }
        self.cumulative_km.last().copied()
    }

    /// Projects `position` onto the segment it is closest to. Ties resolve to
    /// the earliest segment.
    #[must_use]
    pub fn project(&self, position: &Coordinate) -> Option<Projection> {
        if !self.is_usable() {
            return None;
        }

        let mut best: Option<Projection> = None;
        for (segment, pair) in self.points.windows(2).enumerate() {
            let fraction = geometry::segment_fraction(position, &pair[0], &pair[1]);
            let point = geometry::interpolate(&pair[0], &pair[1], fraction);
            let off_route_km = geometry::haversine_km(position, &point);

            if best.is_some_and(|b| off_route_km >= b.off_route_km) {
                continue;
            }
            let progress_km = self.cumulative_km[segment] + geometry::haversine_km(&pair[0], &point);
            best = Some(Projection { segment, fraction, point, progress_km, off_route_km });
        }
        best
    }

    /// Percent of the route covered at `progress_km`, in `[0, 100]`.
    #[must_use]
    pub fn percent(&self, progress_km: f64) -> Option<f64> {
        let length = self.length_km()?;
        if length <= 0.0 {
            return Some(0.0);
        }
        Some((progress_km / length * 100.0).clamp(0.0, 100.0))
    }
}
