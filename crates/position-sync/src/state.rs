use std::fmt;
use std::sync::Arc;

use realtime::{Error, VehicleRecord};
use serde::Serialize;

/// Connection state of the change stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Everything a consumer can observe about the live set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSnapshot {
    /// Active vehicles, ordered by trip id. Shared between snapshots until
    /// the set changes.
    pub vehicles: Arc<[VehicleRecord]>,
    /// A full fetch is in flight.
    pub loading: bool,
    pub last_error: Option<Error>,
    pub connection: ConnectionState,
    /// Consecutive failed connection attempts.
    pub reconnect_attempt: u32,
}

impl Default for FleetSnapshot {
    fn default() -> Self {
        Self {
            vehicles: Arc::from(Vec::new()),
            loading: true,
            last_error: None,
            connection: ConnectionState::Connecting,
            reconnect_attempt: 0,
        }
    }
}

impl FleetSnapshot {
    #[must_use]
    pub fn vehicle(&self, trip_id: &str) -> Option<&VehicleRecord> {
        self.vehicles.iter().find(|vehicle| vehicle.id == trip_id)
    }

    #[must_use]
    pub fn trip_ids(&self) -> Vec<&str> {
        self.vehicles.iter().map(|vehicle| vehicle.id.as_str()).collect()
    }
}
