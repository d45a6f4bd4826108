//! # Position Sync
//!
//! Maintains the live set of active vehicles for a scope (all routes or a
//! single route) from a [`realtime::ChangeFeed`]: an initial full fetch,
//! incremental insert/update/delete events, reconnection with exponential
//! backoff and periodic reconciliation against the feed's point-in-time view.

mod backoff;
mod config;
mod manager;
mod relations;
mod state;
mod store;

pub use crate::backoff::Backoff;
pub use crate::config::{MIN_RECONCILE_INTERVAL, SyncConfig};
pub use crate::manager::SyncManager;
pub use crate::relations::RelationCache;
pub use crate::state::{ConnectionState, FleetSnapshot};
pub use crate::store::{Reconciled, VehicleStore};
