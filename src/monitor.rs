//! # Spacing monitor
//!
//! Watches fleet snapshots and re-evaluates route spacing as vehicles move.
//! Evaluations run at most once per throttle interval and always use the
//! newest snapshot. Reports are published per route; alerts are forwarded
//! only when they first appear.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use position_sync::FleetSnapshot;
use realtime::VehicleRecord;
use route_spacing::{Alert, SpacingReport, SpacingThresholds};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::tracker::AlertTracker;

/// Spacing report for one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteReport {
    pub route_id: String,
    pub route_name: Option<String>,
    pub report: SpacingReport,
}

/// Handle to a running monitor task.
pub struct SpacingMonitor {
    reports: watch::Receiver<Vec<RouteReport>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SpacingMonitor {
    /// Start monitoring `snapshots`. Returns the monitor and the stream of
    /// newly raised alerts.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        snapshots: watch::Receiver<FleetSnapshot>, thresholds: SpacingThresholds, throttle: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (reports_tx, reports) = watch::channel(Vec::new());
        let (alerts_tx, alerts) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = Monitor {
            snapshots,
            thresholds,
            throttle,
            tracker: AlertTracker::new(),
            reports: reports_tx,
            alerts: alerts_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(worker.run());

        (Self { reports, shutdown, task: Some(task) }, alerts)
    }

    /// Receiver for report updates. Reports are ordered by route id.
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Vec<RouteReport>> {
        self.reports.clone()
    }

    #[must_use]
    pub fn latest(&self) -> Vec<RouteReport> {
        self.reports.borrow().clone()
    }

    #[must_use]
    pub fn report(&self, route_id: &str) -> Option<RouteReport> {
        self.reports.borrow().iter().find(|r| r.route_id == route_id).cloned()
    }

    /// Stop the monitor and wait for it to finish. Safe to call more than once.
    pub async fn dispose(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "spacing monitor ended abnormally");
        }
    }
}

impl Drop for SpacingMonitor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

struct Monitor {
    snapshots: watch::Receiver<FleetSnapshot>,
    thresholds: SpacingThresholds,
    throttle: Duration,
    tracker: AlertTracker,
    reports: watch::Sender<Vec<RouteReport>>,
    alerts: mpsc::UnboundedSender<Alert>,
    shutdown: watch::Receiver<bool>,
}

impl Monitor {
    async fn run(mut self) {
        info!(throttle = ?self.throttle, "starting spacing monitor");

        let snapshot = self.snapshots.borrow_and_update().clone();
        self.evaluate(&snapshot);
        let mut last_run = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        debug!("snapshot channel closed");
                        break;
                    }
                }
            }

            let next_run = last_run + self.throttle;
            if Instant::now() < next_run {
                debug!("throttling spacing evaluation");
                tokio::select! {
                    biased;

                    _ = self.shutdown.changed() => break,
                    () = time::sleep_until(next_run) => {}
                }
            }

            // whatever arrived while throttled collapses into the newest snapshot
            let snapshot = self.snapshots.borrow_and_update().clone();
            self.evaluate(&snapshot);
            last_run = Instant::now();
        }

        info!("spacing monitor stopped");
    }

    fn evaluate(&mut self, snapshot: &FleetSnapshot) {
        let evaluated_at = Utc::now();

        let mut routes: BTreeMap<&str, Vec<VehicleRecord>> = BTreeMap::new();
        for vehicle in snapshot.vehicles.iter() {
            routes.entry(vehicle.route_id.as_str()).or_default().push(vehicle.clone());
        }

        let reports: Vec<RouteReport> = routes
            .into_iter()
            .map(|(route_id, vehicles)| {
                let route = vehicles.iter().find_map(|vehicle| vehicle.route.clone());
                let report = route_spacing::evaluate_route(
                    &vehicles,
                    route.as_ref(),
                    &self.thresholds,
                    evaluated_at,
                );
                RouteReport {
                    route_id: route_id.to_string(),
                    route_name: route.map(|route| route.name),
                    report,
                }
            })
            .collect();

        let alerts: Vec<Alert> =
            reports.iter().flat_map(|route| route.report.alerts.iter().cloned()).collect();
        for alert in self.tracker.observe(&alerts) {
            info!(
                monotonic_counter.spacing_alerts = 1,
                kind = %alert.kind,
                severity = ?alert.severity,
                distance_km = alert.distance_km,
                "{}",
                alert.message
            );
            if self.alerts.send(alert).is_err() {
                debug!("alert receiver dropped");
            }
        }

        debug!(routes = reports.len(), vehicles = snapshot.vehicles.len(), "spacing evaluated");
        self.reports.send_replace(reports);
    }
}
