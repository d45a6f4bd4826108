//! Bunching and gap alerts.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spacing::{SpacingRecord, SpacingStatus, SpacingThresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Two vehicles closer than the critical threshold.
    CriticalSpacing,
    /// Two vehicles closer than the too-close threshold.
    TooClose,
    /// A vehicle further than the too-far threshold from its nearest neighbour.
    Gap,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CriticalSpacing => "critical_spacing",
            Self::TooClose => "too_close",
            Self::Gap => "gap",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub trip_ids: Vec<String>,
    pub driver_ids: Vec<String>,
    pub message: String,
    pub distance_km: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Identity used to recognise the same alert across cycles: the type tag
    /// and the sorted affected driver ids.
    #[must_use]
    pub fn key(&self) -> String {
        let mut ids: Vec<&str> = self.driver_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        format!("{}:{}", self.kind, ids.join(","))
    }
}

/// Generates the alerts for one cycle from records in progress order.
///
/// Every critical or too-close vehicle with a vehicle ahead reports that
/// pair, with severity taken from its own status. Each pair is reported once.
#[must_use]
pub fn generate(
    records: &[SpacingRecord], thresholds: &SpacingThresholds, timestamp: DateTime<Utc>,
) -> Vec<Alert> {
    let mut pairs = HashSet::new();
    let mut alerts = Vec::new();

    for record in records {
        match record.status {
            status @ (SpacingStatus::Critical | SpacingStatus::TooClose) => {
                let (Some(ahead), Some(distance)) = (&record.ahead, record.distance_ahead_km) else {
                    continue;
                };
                if !pairs.insert(pair_key(&record.trip_id, &ahead.trip_id)) {
                    continue;
                }

                let (kind, severity) = if status == SpacingStatus::Critical {
                    (AlertKind::CriticalSpacing, Severity::Critical)
                } else {
                    (AlertKind::TooClose, Severity::Warning)
                };
                let message = format!(
                    "{} is {} behind {}",
                    describe(&record.vehicle_label, record.driver_name.as_deref()),
                    format_km(distance),
                    describe(&ahead.vehicle_label, ahead.driver_name.as_deref()),
                );

                alerts.push(Alert {
                    kind,
                    severity,
                    trip_ids: vec![record.trip_id.clone(), ahead.trip_id.clone()],
                    driver_ids: vec![record.driver_id.clone(), ahead.driver_id.clone()],
                    message,
                    distance_km: distance,
                    timestamp,
                });
            }
            SpacingStatus::TooFar => {
                let Some(distance) = record.nearest_km() else {
                    continue;
                };
                let message = format!(
                    "{} has a {} gap to the nearest vehicle (target {}-{})",
                    describe(&record.vehicle_label, record.driver_name.as_deref()),
                    format_km(distance),
                    format_km(thresholds.optimal_min_km),
                    format_km(thresholds.optimal_max_km),
                );

                alerts.push(Alert {
                    kind: AlertKind::Gap,
                    severity: Severity::Info,
                    trip_ids: vec![record.trip_id.clone()],
                    driver_ids: vec![record.driver_id.clone()],
                    message,
                    distance_km: distance,
                    timestamp,
                });
            }
            SpacingStatus::Optimal | SpacingStatus::Isolated => {}
        }
    }

    alerts
}

// Order independent so A-B and B-A collapse to one entry.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b { (a.to_string(), b.to_string()) } else { (b.to_string(), a.to_string()) }
}

fn describe(vehicle: &str, driver: Option<&str>) -> String {
    driver.map_or_else(|| vehicle.to_string(), |name| format!("{vehicle} ({name})"))
}

fn format_km(distance: f64) -> String {
    format!("{distance:.2} km")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::geometry::Coordinate;
    use crate::spacing::Neighbor;

    fn record(trip: &str, status: SpacingStatus) -> SpacingRecord {
        SpacingRecord {
            trip_id: trip.to_string(),
            driver_id: format!("driver-{trip}"),
            driver_name: None,
            vehicle_label: format!("bus-{trip}"),
            position: Coordinate::default(),
            rank: 0,
            progress_km: None,
            progress_percent: None,
            off_route_km: None,
            distance_ahead_km: None,
            distance_behind_km: None,
            ahead: None,
            behind: None,
            status,
            minutes_to_ahead: None,
            minutes_to_behind: None,
        }
    }

    fn neighbor(trip: &str) -> Neighbor {
        Neighbor {
            trip_id: trip.to_string(),
            driver_id: format!("driver-{trip}"),
            driver_name: Some("Sam".to_string()),
            vehicle_label: format!("bus-{trip}"),
            position: Coordinate::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn key_is_order_independent() {
        let mut alert = Alert {
            kind: AlertKind::TooClose,
            severity: Severity::Warning,
            trip_ids: vec!["b".to_string(), "a".to_string()],
            driver_ids: vec!["d2".to_string(), "d1".to_string()],
            message: String::new(),
            distance_km: 0.4,
            timestamp: now(),
        };
        assert_eq!(alert.key(), "too_close:d1,d2");
        alert.driver_ids.reverse();
        assert_eq!(alert.key(), "too_close:d1,d2");
    }

    #[test]
    fn pair_reported_once() {
        let mut leader = record("a", SpacingStatus::TooClose);
        leader.distance_behind_km = Some(0.4);
        leader.behind = Some(neighbor("b"));

        let mut trailer = record("b", SpacingStatus::TooClose);
        trailer.distance_ahead_km = Some(0.4);
        trailer.ahead = Some(neighbor("a"));

        // the same pair seen again from a duplicated record
        let duplicate = trailer.clone();

        let alerts = generate(&[leader, trailer, duplicate], &SpacingThresholds::default(), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::TooClose);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].driver_ids, vec!["driver-b", "driver-a"]);
        assert_eq!(alerts[0].message, "bus-b is 0.40 km behind bus-a (Sam)");
    }

    #[test]
    fn critical_severity() {
        let mut trailer = record("b", SpacingStatus::Critical);
        trailer.distance_ahead_km = Some(0.1);
        trailer.ahead = Some(neighbor("a"));

        let alerts = generate(&[trailer], &SpacingThresholds::default(), now());
        assert_eq!(alerts[0].kind, AlertKind::CriticalSpacing);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn far_leader_still_paired() {
        // critical because of the vehicle behind, leader is far away
        let mut middle = record("b", SpacingStatus::Critical);
        middle.distance_ahead_km = Some(4.0);
        middle.ahead = Some(neighbor("a"));
        middle.distance_behind_km = Some(0.1);
        middle.behind = Some(neighbor("c"));

        let alerts = generate(&[middle], &SpacingThresholds::default(), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CriticalSpacing);
        assert_eq!(alerts[0].trip_ids, vec!["b", "a"]);
        assert!((alerts[0].distance_km - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn severity_follows_status() {
        // too-close gap ahead, but critical because of the vehicle behind
        let mut middle = record("b", SpacingStatus::Critical);
        middle.distance_ahead_km = Some(0.4);
        middle.ahead = Some(neighbor("a"));
        middle.distance_behind_km = Some(0.1);
        middle.behind = Some(neighbor("c"));

        let alerts = generate(&[middle], &SpacingThresholds::default(), now());
        assert_eq!(alerts[0].kind, AlertKind::CriticalSpacing);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn gap_alert() {
        let mut lonely = record("a", SpacingStatus::TooFar);
        lonely.distance_behind_km = Some(4.25);
        lonely.behind = Some(neighbor("b"));

        let alerts = generate(&[lonely], &SpacingThresholds::default(), now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Gap);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].driver_ids, vec!["driver-a"]);
        assert_eq!(
            alerts[0].message,
            "bus-a has a 4.25 km gap to the nearest vehicle (target 0.80 km-2.00 km)"
        );
    }
}
