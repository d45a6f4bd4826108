//! # Route Spacing
//!
//! Projects active vehicles onto their route, orders them by progress, and
//! derives neighbour spacing, bunching alerts and route statistics.
//!
//! Everything here is pure: evaluation reads its arguments and allocates new
//! output, so it can be called from any thread as often as needed.

mod error;

pub mod alerts;
pub mod geometry;
pub mod polyline;
pub mod route;
pub mod spacing;
pub mod stats;

pub use self::alerts::{Alert, AlertKind, Severity};
pub use self::error::{Error, Result};
pub use self::geometry::{Coordinate, EARTH_RADIUS_KM, haversine_km};
pub use self::route::{GeometrySource, Projection, RouteGeometry};
pub use self::spacing::{
    Neighbor, SpacingRecord, SpacingReport, SpacingStatus, SpacingThresholds, evaluate,
    evaluate_route,
};
pub use self::stats::RouteStats;
