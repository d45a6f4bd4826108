//! Vehicle ordering, neighbour distances and spacing classification.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use realtime::{RouteDetails, VehicleRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alerts::{self, Alert};
use crate::error::{Error, Result};
use crate::geometry::{self, Coordinate};
use crate::route::{GeometrySource, Projection, RouteGeometry};
use crate::stats::RouteStats;

/// Spacing thresholds in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpacingThresholds {
    pub critical_km: f64,
    pub too_close_km: f64,
    pub optimal_min_km: f64,
    pub optimal_max_km: f64,
    pub too_far_km: f64,
}

impl Default for SpacingThresholds {
    fn default() -> Self {
        Self {
            critical_km: 0.3,
            too_close_km: 0.5,
            optimal_min_km: 0.8,
            optimal_max_km: 2.0,
            too_far_km: 3.0,
        }
    }
}

impl SpacingThresholds {
    /// Checks the thresholds are positive, finite and non-decreasing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Thresholds`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let ordered = [
            ("critical", self.critical_km),
            ("too_close", self.too_close_km),
            ("optimal_min", self.optimal_min_km),
            ("optimal_max", self.optimal_max_km),
            ("too_far", self.too_far_km),
        ];

        for (name, value) in ordered {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Thresholds(format!("{name} must be positive, got {value}")));
            }
        }
        for pair in ordered.windows(2) {
            let ((lower, low), (upper, high)) = (pair[0], pair[1]);
            if low > high {
                return Err(Error::Thresholds(format!("{lower} ({low}) exceeds {upper} ({high})")));
            }
        }
        Ok(())
    }

    /// Classifies a vehicle by the nearer of its two neighbours.
    ///
    /// Precedence is critical, too close, too far, optimal. Distances between
    /// the named bands are within tolerance and reported as optimal.
    #[must_use]
    pub fn classify(&self, ahead_km: Option<f64>, behind_km: Option<f64>) -> SpacingStatus {
        if ahead_km.is_none() && behind_km.is_none() {
            return SpacingStatus::Isolated;
        }
        let nearest = ahead_km.unwrap_or(f64::INFINITY).min(behind_km.unwrap_or(f64::INFINITY));

        if nearest < self.critical_km {
            SpacingStatus::Critical
        } else if nearest < self.too_close_km {
            SpacingStatus::TooClose
        } else if nearest > self.too_far_km {
            SpacingStatus::TooFar
        } else {
            SpacingStatus::Optimal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingStatus {
    Optimal,
    TooClose,
    TooFar,
    Isolated,
    Critical,
}

impl SpacingStatus {
    /// Critical or too close.
    #[must_use]
    pub const fn is_poor(self) -> bool {
        matches!(self, Self::Critical | Self::TooClose)
    }
}

/// Reference to an adjacent vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub trip_id: String,
    pub driver_id: String,
    pub driver_name: Option<String>,
    pub vehicle_label: String,
    pub position: Coordinate,
}

/// Spacing facts for one vehicle in one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpacingRecord {
    pub trip_id: String,
    pub driver_id: String,
    pub driver_name: Option<String>,
    pub vehicle_label: String,
    pub position: Coordinate,

    /// Zero-based position in progress order; 0 is nearest the route start.
    /// The "ahead" neighbour is the previous rank, "behind" the next.
    pub rank: usize,
    pub progress_km: Option<f64>,
    pub progress_percent: Option<f64>,
    pub off_route_km: Option<f64>,

    pub distance_ahead_km: Option<f64>,
    pub distance_behind_km: Option<f64>,
    pub ahead: Option<Neighbor>,
    pub behind: Option<Neighbor>,
    pub status: SpacingStatus,

    /// Minutes to reach the vehicle ahead at this vehicle's speed.
    pub minutes_to_ahead: Option<f64>,
    /// Minutes for the vehicle behind to close the gap at its own speed.
    pub minutes_to_behind: Option<f64>,
}

impl SpacingRecord {
    /// Distance to the nearer neighbour.
    #[must_use]
    pub fn nearest_km(&self) -> Option<f64> {
        match (self.distance_ahead_km, self.distance_behind_km) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Output of one evaluation cycle for a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpacingReport {
    pub evaluated_at: DateTime<Utc>,
    pub geometry: GeometrySource,
    pub route_length_km: Option<f64>,

    /// Trip ids in progress order.
    pub order: Vec<String>,
    pub records: HashMap<String, SpacingRecord>,
    pub alerts: Vec<Alert>,
    pub stats: RouteStats,
}

impl SpacingReport {
    /// Records in progress order.
    pub fn ordered(&self) -> impl Iterator<Item = &SpacingRecord> {
        self.order.iter().filter_map(|trip_id| self.records.get(trip_id))
    }
}

struct Placed<'a> {
    record: &'a VehicleRecord,
    position: Coordinate,
    projection: Option<Projection>,
}

impl Placed<'_> {
    fn neighbor(&self) -> Neighbor {
        Neighbor {
            trip_id: self.record.id.clone(),
            driver_id: self.record.driver_id.clone(),
            driver_name: self.record.driver_name().map(str::to_string),
            vehicle_label: self.record.vehicle_label().to_string(),
            position: self.position,
        }
    }
}

/// Evaluates spacing for the vehicles on one route, building geometry from
/// the route details when present.
#[must_use]
pub fn evaluate_route(
    vehicles: &[VehicleRecord], route: Option<&RouteDetails>, thresholds: &SpacingThresholds,
    evaluated_at: DateTime<Utc>,
) -> SpacingReport {
    let geometry = route.map_or_else(RouteGeometry::unavailable, RouteGeometry::from_route);
    evaluate(vehicles, &geometry, thresholds, evaluated_at)
}

/// Evaluates spacing for the vehicles on one route.
///
/// Pure: the same inputs always produce the same report. Vehicles with
/// invalid coordinates are left out, as are repeated trip ids after the
/// first.
#[must_use]
pub fn evaluate(
    vehicles: &[VehicleRecord], geometry: &RouteGeometry, thresholds: &SpacingThresholds,
    evaluated_at: DateTime<Utc>,
) -> SpacingReport {
    let placed = order(place(vehicles, geometry), geometry);

    let records: Vec<SpacingRecord> = placed
        .iter()
        .enumerate()
        .map(|(rank, current)| {
            let ahead = rank.checked_sub(1).map(|i| &placed[i]);
            let behind = placed.get(rank + 1);
            spacing_record(rank, current, ahead, behind, geometry, thresholds)
        })
        .collect();

    let alerts = alerts::generate(&records, thresholds, evaluated_at);
    let stats = RouteStats::from_records(&records);
    debug!(
        vehicles = records.len(),
        alerts = alerts.len(),
        geometry = ?geometry.source(),
        "evaluated route spacing"
    );

    let order = records.iter().map(|r| r.trip_id.clone()).collect();
    let records = records.into_iter().map(|r| (r.trip_id.clone(), r)).collect();

    SpacingReport {
        evaluated_at,
        geometry: geometry.source(),
        route_length_km: geometry.length_km(),
        order,
        records,
        alerts,
        stats,
    }
}

fn place<'a>(vehicles: &'a [VehicleRecord], geometry: &RouteGeometry) -> Vec<Placed<'a>> {
    let mut seen = HashSet::new();
    vehicles
        .iter()
        .filter_map(|record| {
            let position = Coordinate::new(record.latitude, record.longitude);
            if !position.is_valid() {
                debug!(trip_id = %record.id, "skipping vehicle without a valid position");
                return None;
            }
            if !seen.insert(record.id.as_str()) {
                return None;
            }
            Some(Placed { record, position, projection: geometry.project(&position) })
        })
        .collect()
}

// Ascending route progress when geometry is usable, otherwise descending
// latitude. Trip id breaks ties so the order is stable across calls.
fn order<'a>(mut placed: Vec<Placed<'a>>, geometry: &RouteGeometry) -> Vec<Placed<'a>> {
    if geometry.is_usable() {
        placed.sort_by(|a, b| {
            let pa = a.projection.map_or(0.0, |p| p.progress_km);
            let pb = b.projection.map_or(0.0, |p| p.progress_km);
            pa.total_cmp(&pb).then_with(|| a.record.id.cmp(&b.record.id))
        });
    } else {
        placed.sort_by(|a, b| {
            b.position.lat.total_cmp(&a.position.lat).then_with(|| a.record.id.cmp(&b.record.id))
        });
    }
    placed
}

fn spacing_record(
    rank: usize, current: &Placed<'_>, ahead: Option<&Placed<'_>>, behind: Option<&Placed<'_>>,
    geometry: &RouteGeometry, thresholds: &SpacingThresholds,
) -> SpacingRecord {
    let distance_ahead_km = ahead.map(|a| geometry::haversine_km(&current.position, &a.position));
    let distance_behind_km = behind.map(|b| geometry::haversine_km(&current.position, &b.position));

    let minutes_to_ahead = distance_ahead_km.and_then(|d| minutes(d, current.record.speed));
    let minutes_to_behind =
        distance_behind_km.and_then(|d| minutes(d, behind.and_then(|b| b.record.speed)));

    let progress_km = current.projection.map(|p| p.progress_km);

    SpacingRecord {
        trip_id: current.record.id.clone(),
        driver_id: current.record.driver_id.clone(),
        driver_name: current.record.driver_name().map(str::to_string),
        vehicle_label: current.record.vehicle_label().to_string(),
        position: current.position,
        rank,
        progress_km,
        progress_percent: progress_km.and_then(|p| geometry.percent(p)),
        off_route_km: current.projection.map(|p| p.off_route_km),
        distance_ahead_km,
        distance_behind_km,
        ahead: ahead.map(Placed::neighbor),
        behind: behind.map(Placed::neighbor),
        status: thresholds.classify(distance_ahead_km, distance_behind_km),
        minutes_to_ahead,
        minutes_to_behind,
    }
}

fn minutes(distance_km: f64, speed_kmh: Option<f64>) -> Option<f64> {
    speed_kmh.filter(|s| s.is_finite() && *s > 0.0).map(|s| distance_km / s * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        assert_eq!(SpacingThresholds::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let thresholds = SpacingThresholds { too_close_km: 0.2, ..SpacingThresholds::default() };
        assert_eq!(
            thresholds.validate(),
            Err(Error::Thresholds("critical (0.3) exceeds too_close (0.2)".to_string()))
        );

        let thresholds = SpacingThresholds { too_far_km: f64::NAN, ..SpacingThresholds::default() };
        assert!(matches!(thresholds.validate(), Err(Error::Thresholds(_))));
    }

    #[test]
    fn classification_precedence() {
        let t = SpacingThresholds::default();

        assert_eq!(t.classify(None, None), SpacingStatus::Isolated);
        assert_eq!(t.classify(Some(0.29), None), SpacingStatus::Critical);
        assert_eq!(t.classify(Some(0.3), None), SpacingStatus::TooClose);
        assert_eq!(t.classify(None, Some(0.49)), SpacingStatus::TooClose);
        assert_eq!(t.classify(Some(0.5), None), SpacingStatus::Optimal);
        assert_eq!(t.classify(Some(1.2), Some(5.0)), SpacingStatus::Optimal);
        assert_eq!(t.classify(Some(3.0), None), SpacingStatus::Optimal);
        assert_eq!(t.classify(Some(3.01), None), SpacingStatus::TooFar);
        assert_eq!(t.classify(Some(4.0), Some(0.1)), SpacingStatus::Critical);
    }

    #[test]
    fn minutes_need_positive_speed() {
        assert_eq!(minutes(1.0, Some(30.0)), Some(2.0));
        assert_eq!(minutes(1.0, Some(0.0)), None);
        assert_eq!(minutes(1.0, Some(-5.0)), None);
        assert_eq!(minutes(1.0, None), None);
    }

    #[test]
    fn poor_statuses() {
        assert!(SpacingStatus::Critical.is_poor());
        assert!(SpacingStatus::TooClose.is_poor());
        assert!(!SpacingStatus::TooFar.is_poor());
        assert!(!SpacingStatus::Isolated.is_poor());
    }
}
