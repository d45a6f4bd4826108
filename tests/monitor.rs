#![allow(missing_docs)]


use std::time::Duration;

use fleet::{Config, Fleet, SpacingMonitor};
use pretty_assertions::assert_eq;
use route_spacing::{AlertKind, Severity, SpacingStatus, SpacingThresholds};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use self::provider::{StaticFeed, snapshot, vehicle};

const THROTTLE: Duration = Duration::from_millis(1_500);

// Should evaluate the current snapshot straight away and raise its alerts.
#[tokio::test(start_paused = true)]
async fn initial_evaluation() {
    let (_tx, rx) = watch::channel(snapshot(vec![
        vehicle("trip-1", "route-1", 1.0),
        vehicle("trip-2", "route-1", 1.1),
    ]));
    let (mut monitor, mut alerts) = SpacingMonitor::spawn(rx, SpacingThresholds::default(), THROTTLE);

    let alert = alerts.recv().await.expect("should raise alert");
    assert_eq!(alert.kind, AlertKind::CriticalSpacing);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.trip_ids, vec!["trip-2", "trip-1"]);

    let report = monitor.report("route-1").expect("should report route");
    assert_eq!(report.route_name.as_deref(), Some("Route route-1"));
    assert_eq!(report.report.order, vec!["trip-1", "trip-2"]);
    assert_eq!(report.report.records["trip-1"].status, SpacingStatus::Critical);

    monitor.dispose().await;
}

// Should forward an alert once while the condition persists, and again
// after it clears and recurs.
#[tokio::test(start_paused = true)]
async fn alerts_on_change_only() {
    let (tx, rx) = watch::channel(snapshot(vec![
        vehicle("trip-1", "route-1", 1.0),
        vehicle("trip-2", "route-1", 1.1),
    ]));
    let (mut monitor, mut alerts) = SpacingMonitor::spawn(rx, SpacingThresholds::default(), THROTTLE);
    let mut reports = monitor.reports();

    alerts.recv().await.expect("should raise alert");
    reports.changed().await.expect("monitor should run");

    // still bunched
    tx.send_replace(snapshot(vec![
        vehicle("trip-1", "route-1", 1.2),
        vehicle("trip-2", "route-1", 1.35),
    ]));
    reports.changed().await.expect("monitor should run");
    assert_eq!(alerts.try_recv(), Err(TryRecvError::Empty));

    // spread out
    tx.send_replace(snapshot(vec![
        vehicle("trip-1", "route-1", 1.4),
        vehicle("trip-2", "route-1", 2.8),
    ]));
    reports.changed().await.expect("monitor should run");
    assert_eq!(alerts.try_recv(), Err(TryRecvError::Empty));
    let report = monitor.report("route-1").expect("should report route");
    assert_eq!(report.report.stats.optimal_count, 2);

    // bunched again
    tx.send_replace(snapshot(vec![
        vehicle("trip-1", "route-1", 1.5),
        vehicle("trip-2", "route-1", 1.7),
    ]));
    let alert = alerts.recv().await.expect("should raise alert again");
    assert_eq!(alert.kind, AlertKind::CriticalSpacing);

    monitor.dispose().await;
}

// Should evaluate at most once per throttle interval, using the newest
// snapshot.
#[tokio::test(start_paused = true)]
async fn throttled_to_newest_snapshot() {
    let (tx, rx) = watch::channel(snapshot(Vec::new()));
    let (mut monitor, _alerts) = SpacingMonitor::spawn(rx, SpacingThresholds::default(), THROTTLE);
    let mut reports = monitor.reports();

    reports.changed().await.expect("monitor should run");
    let first = Instant::now();
    assert!(reports.borrow_and_update().is_empty());

    tx.send_replace(snapshot(vec![vehicle("trip-1", "route-1", 1.0)]));
    tx.send_replace(snapshot(vec![
        vehicle("trip-1", "route-1", 1.0),
        vehicle("trip-2", "route-1", 4.0),
    ]));
    tx.send_replace(snapshot(vec![
        vehicle("trip-1", "route-1", 1.0),
        vehicle("trip-2", "route-1", 4.0),
        vehicle("trip-3", "route-1", 7.0),
    ]));

    reports.changed().await.expect("monitor should run");
    assert!(Instant::now() - first >= THROTTLE);
    assert_eq!(reports.borrow_and_update()[0].report.order.len(), 3);

    // nothing new to evaluate
    time::sleep(Duration::from_secs(5)).await;
    assert!(!reports.has_changed().expect("monitor should be alive"));

    monitor.dispose().await;
}

// Should evaluate each route separately.
#[tokio::test(start_paused = true)]
async fn grouped_by_route() {
    let (_tx, rx) = watch::channel(snapshot(vec![
        vehicle("trip-1", "route-1", 1.0),
        vehicle("trip-2", "route-2", 1.05),
        vehicle("trip-3", "route-1", 5.0),
    ]));
    let (mut monitor, mut alerts) = SpacingMonitor::spawn(rx, SpacingThresholds::default(), THROTTLE);
    monitor.reports().changed().await.expect("monitor should run");

    let reports = monitor.latest();
    let routes: Vec<&str> = reports.iter().map(|r| r.route_id.as_str()).collect();
    assert_eq!(routes, vec!["route-1", "route-2"]);

    // trip-2 is close to trip-1 on the map but on another route
    assert_eq!(reports[0].report.order, vec!["trip-1", "trip-3"]);
    assert_eq!(reports[1].report.records["trip-2"].status, SpacingStatus::Isolated);

    // the two route-1 vehicles are 4 km apart, each reports its own gap
    let first = alerts.recv().await.expect("should raise gap alert");
    let second = alerts.recv().await.expect("should raise gap alert");
    assert_eq!((first.kind, second.kind), (AlertKind::Gap, AlertKind::Gap));
    assert_eq!(first.trip_ids, vec!["trip-1"]);
    assert_eq!(second.trip_ids, vec!["trip-3"]);
    assert_eq!(alerts.try_recv(), Err(TryRecvError::Empty));

    monitor.dispose().await;
}

// Should stop once the snapshot source goes away.
#[tokio::test(start_paused = true)]
async fn stops_when_source_closes() {
    let (tx, rx) = watch::channel(snapshot(Vec::new()));
    let (mut monitor, mut alerts) = SpacingMonitor::spawn(rx, SpacingThresholds::default(), THROTTLE);

    drop(tx);
    assert!(alerts.recv().await.is_none());

    monitor.dispose().await;
    monitor.dispose().await;
}

// Should wire sync and spacing together.
#[tokio::test(start_paused = true)]
async fn fleet_end_to_end() {
    let feed = StaticFeed::new(vec![
        vehicle("trip-1", "route-1", 2.0),
        vehicle("trip-2", "route-1", 2.4),
        vehicle("trip-3", "route-2", 3.0),
    ]);
    let config = Config { scope: realtime::Scope::route("route-1"), ..Config::default() };
    let (mut fleet, mut alerts) = Fleet::start(feed.clone(), &config);

    let alert = alerts.recv().await.expect("should raise alert");
    assert_eq!(alert.kind, AlertKind::TooClose);
    assert_eq!(alert.severity, Severity::Warning);

    let reports = fleet.monitor().latest();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].route_id, "route-1");
    assert_eq!(fleet.sync().vehicles().len(), 2);
    assert!(feed.sink().is_some());

    fleet.dispose().await;
    assert!(fleet.sync().is_disposed());
}
