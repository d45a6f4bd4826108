use std::collections::HashSet;

use route_spacing::Alert;

/// Tracks which alerts were raised in the previous cycle so each condition
/// is reported once when it appears rather than on every evaluation.
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    active: HashSet<String>,
}

impl AlertTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this cycle's alerts and return those whose key was absent in
    /// the previous cycle. A condition that clears and later recurs is
    /// reported again.
    pub fn observe(&mut self, alerts: &[Alert]) -> Vec<Alert> {
        let current: HashSet<String> = alerts.iter().map(Alert::key).collect();
        let fresh = alerts.iter().filter(|alert| !self.active.contains(&alert.key())).cloned().collect();
        self.active = current;
        fresh
    }

    /// Keys of the alerts raised in the last cycle.
    #[must_use]
    pub const fn active(&self) -> &HashSet<String> {
        &self.active
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}
