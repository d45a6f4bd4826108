//! # Vehicle store
//!
//! The keyed set of active trips. Holds at most one record per trip id.
//! Every mutation bumps a revision so readers can tell when to rebuild
//! derived views.

use std::collections::HashMap;

use realtime::VehicleRecord;

#[derive(Debug, Clone, Default)]
pub struct VehicleStore {
    records: HashMap<String, VehicleRecord>,
    revision: u64,
}

/// Outcome of replacing the whole set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

impl VehicleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, trip_id: &str) -> bool {
        self.records.contains_key(trip_id)
    }

    #[must_use]
    pub fn get(&self, trip_id: &str) -> Option<&VehicleRecord> {
        self.records.get(trip_id)
    }

    /// Mutable access to a record. Counts as a change when the trip exists.
    pub fn get_mut(&mut self, trip_id: &str) -> Option<&mut VehicleRecord> {
        let record = self.records.get_mut(trip_id)?;
        self.revision += 1;
        Some(record)
    }

    /// Insert a record unless its trip is already present. Returns whether
    /// the set changed.
    pub fn insert(&mut self, record: VehicleRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, trip_id: &str) -> Option<VehicleRecord> {
        let removed = self.records.remove(trip_id)?;
        self.revision += 1;
        Some(removed)
    }

    /// Replace the set wholesale. Later duplicates of a trip id win.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = VehicleRecord>) -> Reconciled {
        let next: HashMap<String, VehicleRecord> =
            records.into_iter().map(|record| (record.id.clone(), record)).collect();

        let added = next.keys().filter(|id| !self.records.contains_key(*id)).count();
        let removed = self.records.keys().filter(|id| !next.contains_key(*id)).count();
        self.records = next;
        self.revision += 1;

        Reconciled { added, removed, total: self.records.len() }
    }

    /// Changes whenever the set or any record in it may have changed.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Owned copy of the set, ordered by trip id.
    #[must_use]
    pub fn to_vec(&self) -> Vec<VehicleRecord> {
        let mut vehicles: Vec<VehicleRecord> = self.records.values().cloned().collect();
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        vehicles
    }
}
