//! # Fleet
//!
//! Live fleet monitoring: a [`SyncManager`] keeps the active vehicle set
//! current and a [`SpacingMonitor`] re-evaluates route spacing as it changes,
//! raising bunching and gap alerts.

mod config;
mod monitor;
mod tracker;

use position_sync::SyncManager;
use realtime::ChangeFeed;
use route_spacing::Alert;
use tokio::sync::mpsc;
use tracing::info;

pub use crate::config::Config;
pub use crate::monitor::{RouteReport, SpacingMonitor};
pub use crate::tracker::AlertTracker;

/// A running sync manager with a spacing monitor attached.
pub struct Fleet<F: ChangeFeed> {
    sync: SyncManager<F>,
    monitor: SpacingMonitor,
}

impl<F: ChangeFeed> Fleet<F> {
    /// Start syncing from `feed` and monitoring spacing. Returns the fleet
    /// and the stream of newly raised alerts.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn start(feed: F, config: &Config) -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let mut sync = SyncManager::new(feed, config.scope.clone()).with_config(config.sync);
        let snapshots = sync.watch();
        sync.start();

        let (monitor, alerts) =
            SpacingMonitor::spawn(snapshots, config.thresholds, config.evaluation_throttle);
        info!(route_id = ?config.scope.route_id, "fleet monitoring started");

        (Self { sync, monitor }, alerts)
    }

    #[must_use]
    pub const fn sync(&self) -> &SyncManager<F> {
        &self.sync
    }

    #[must_use]
    pub const fn monitor(&self) -> &SpacingMonitor {
        &self.monitor
    }

    /// Stop monitoring and syncing. Safe to call more than once.
    pub async fn dispose(&mut self) {
        self.monitor.dispose().await;
        self.sync.dispose().await;
    }
}
