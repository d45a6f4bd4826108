use std::time::Duration;

use crate::backoff::Backoff;

/// Shortest background reconciliation period the worker will run with.
pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

/// Sync manager timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Interval between background reconciliations.
    pub reconcile_interval: Duration,
    /// First reconnect delay; doubles per consecutive failure.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
        }
    }
}

impl SyncConfig {
    /// Reconciliation period, never shorter than [`MIN_RECONCILE_INTERVAL`].
    #[must_use]
    pub fn reconcile_period(&self) -> Duration {
        self.reconcile_interval.max(MIN_RECONCILE_INTERVAL)
    }

    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_base, self.reconnect_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_clamped() {
        let config = SyncConfig { reconcile_interval: Duration::ZERO, ..SyncConfig::default() };
        assert_eq!(config.reconcile_period(), MIN_RECONCILE_INTERVAL);
        assert_eq!(SyncConfig::default().reconcile_period(), Duration::from_secs(30));
    }
}
