//! # Model
//!
//! Wire types shared by the change feed, the sync manager and the spacing
//! engine. Field names follow the backend's column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of a trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

/// One active vehicle-on-trip.
///
/// Change events carry only the scalar columns; records returned by a full
/// fetch also carry the joined `vehicle`, `driver` and `route` relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Trip id.
    pub id: String,
    pub driver_id: String,
    pub vehicle_id: String,
    pub route_id: String,

    #[serde(rename = "current_lat")]
    pub latitude: f64,
    #[serde(rename = "current_lng")]
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,

    /// Speed in km/h.
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub passenger_count: i64,
    #[serde(default)]
    pub status: TripStatus,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteDetails>,
}

impl VehicleRecord {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, TripStatus::Active)
    }

    /// Copies the scalar columns of `other` onto this record, leaving the
    /// joined relations untouched.
    pub fn patch_scalars(&mut self, other: &Self) {
        self.driver_id.clone_from(&other.driver_id);
        self.vehicle_id.clone_from(&other.vehicle_id);
        self.route_id.clone_from(&other.route_id);
        self.latitude = other.latitude;
        self.longitude = other.longitude;
        self.heading = other.heading;
        self.speed = other.speed;
        self.passenger_count = other.passenger_count;
        self.status = other.status;
        self.updated_at = other.updated_at;
    }

    /// Driver display name, when the driver relation is known.
    #[must_use]
    pub fn driver_name(&self) -> Option<&str> {
        self.driver.as_ref().map(|driver| driver.full_name.as_str())
    }

    /// Vehicle label for messages: plate number when known, otherwise the id.
    #[must_use]
    pub fn vehicle_label(&self) -> &str {
        self.vehicle
            .as_ref()
            .and_then(|vehicle| vehicle.plate_number.as_deref())
            .unwrap_or(&self.vehicle_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub id: String,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDetails {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Route details, including whatever geometry the backend holds for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDetails {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,

    /// Precomputed encoded path.
    #[serde(default)]
    pub polyline: Option<String>,

    /// Ordered stops, used when no polyline is present.
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub name: Option<String>,
}

/// Subscription scope: all active vehicles, or those on one route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub route_id: Option<String>,
}

impl Scope {
    #[must_use]
    pub const fn all() -> Self {
        Self { route_id: None }
    }

    #[must_use]
    pub fn route(route_id: impl Into<String>) -> Self {
        Self { route_id: Some(route_id.into()) }
    }

    /// Whether a record's route passes the route filter.
    #[must_use]
    pub fn matches_route(&self, route_id: &str) -> bool {
        self.route_id.as_deref().is_none_or(|filter| filter == route_id)
    }

    /// Whether a record belongs to the scope's active set.
    #[must_use]
    pub fn contains(&self, record: &VehicleRecord) -> bool {
        record.is_active() && self.matches_route(&record.route_id)
    }

    /// Channel name used for the scope's change stream.
    #[must_use]
    pub fn channel_name(&self) -> String {
        self.route_id
            .as_ref()
            .map_or_else(|| "active-trips".to_string(), |route| format!("active-trips:{route}"))
    }
}

/// Incremental change delivered by the feed.
///
/// Mirrors the feed envelope:
/// `{"eventType": "UPDATE", "new": {...}, "old": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert {
        new: VehicleRecord,
    },
    Update {
        new: VehicleRecord,
    },
    Delete {
        #[serde(default)]
        old: OldRecord,
    },
}

impl ChangeEvent {
    /// Trip id the event refers to, if the payload carries one.
    #[must_use]
    pub fn trip_id(&self) -> Option<&str> {
        match self {
            Self::Insert { new } | Self::Update { new } => Some(new.id.as_str()),
            Self::Delete { old } => old.id.as_deref(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

impl TryFrom<&[u8]> for ChangeEvent {
    type Error = Error;

    /// Decode a raw feed payload. Inserts and updates must carry a trip id.
    fn try_from(payload: &[u8]) -> Result<Self> {
        let event: Self = serde_json::from_slice(payload)?;
        if let Self::Insert { new } | Self::Update { new } = &event
            && new.id.trim().is_empty()
        {
            return Err(Error::MissingField("new.id".to_string()));
        }
        Ok(event)
    }
}

/// Previous row image. Some transports only send the primary key, and some
/// send nothing at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldRecord {
    #[serde(default)]
    pub id: Option<String>,
}
