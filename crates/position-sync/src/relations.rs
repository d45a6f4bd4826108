//! # Relation cache
//!
//! Change events only carry foreign keys. The cache remembers the joined
//! vehicle, driver and route details seen in full fetches so patched records
//! keep their display fields. It is shared by reference and may back more
//! than one manager.

use dashmap::DashMap;
use realtime::{DriverDetails, RouteDetails, VehicleDetails, VehicleRecord};

#[derive(Debug, Default)]
pub struct RelationCache {
    vehicles: DashMap<String, VehicleDetails>,
    drivers: DashMap<String, DriverDetails>,
    routes: DashMap<String, RouteDetails>,
}

impl RelationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember every relation present on `record`, keyed by the record's
    /// foreign keys.
    pub fn absorb(&self, record: &VehicleRecord) {
        if let Some(vehicle) = &record.vehicle {
            self.vehicles.insert(record.vehicle_id.clone(), vehicle.clone());
        }
        if let Some(driver) = &record.driver {
            self.drivers.insert(record.driver_id.clone(), driver.clone());
        }
        if let Some(route) = &record.route {
            self.routes.insert(record.route_id.clone(), route.clone());
        }
    }

    /// Re-resolve the relations of `record` from its foreign keys. A relation
    /// with no cache entry keeps whatever value the record already holds.
    pub fn resolve(&self, record: &mut VehicleRecord) {
        if let Some(vehicle) = self.vehicle(&record.vehicle_id) {
            record.vehicle = Some(vehicle);
        }
        if let Some(driver) = self.driver(&record.driver_id) {
            record.driver = Some(driver);
        }
        if let Some(route) = self.route(&record.route_id) {
            record.route = Some(route);
        }
    }

    #[must_use]
    pub fn vehicle(&self, vehicle_id: &str) -> Option<VehicleDetails> {
        self.vehicles.get(vehicle_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn driver(&self, driver_id: &str) -> Option<DriverDetails> {
        self.drivers.get(driver_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn route(&self, route_id: &str) -> Option<RouteDetails> {
        self.routes.get(route_id).map(|entry| entry.value().clone())
    }

    /// Total number of cached relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len() + self.drivers.len() + self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.vehicles.clear();
        self.drivers.clear();
        self.routes.clear();
    }
}
