//! # Sync manager
//!
//! Keeps an always-current set of active vehicles by combining a full fetch
//! with the feed's incremental change stream.
//!
//! A single worker task owns the set. Feed messages, reconnect timers,
//! background reconciliation and caller commands are all serialized through
//! it, so mutations never interleave. Consumers observe the set through a
//! `watch` channel of [`FleetSnapshot`]s.

use std::sync::Arc;

use anyhow::Context as _;
use realtime::{
    ChangeEvent, ChangeFeed, ChannelStatus, Envelope, Error, FeedMessage, FeedSink, OldRecord,
    Result, Scope, Subscription, VehicleRecord,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::config::SyncConfig;
use crate::relations::RelationCache;
use crate::state::{ConnectionState, FleetSnapshot};
use crate::store::VehicleStore;

/// Owns the live vehicle set for one scope.
pub struct SyncManager<F: ChangeFeed> {
    feed: Arc<F>,
    scope: Scope,
    config: SyncConfig,
    relations: Arc<RelationCache>,
    snapshot: Arc<watch::Sender<FleetSnapshot>>,
    lifecycle: Lifecycle,
}

enum Lifecycle {
    Idle,
    Running(Running),
    Disposed,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum Command {
    Refetch(oneshot::Sender<Result<()>>),
}

impl<F: ChangeFeed> SyncManager<F> {
    /// Create a manager with default timings and a private relation cache.
    pub fn new(feed: F, scope: Scope) -> Self {
        let (snapshot, _) = watch::channel(FleetSnapshot::default());
        Self {
            feed: Arc::new(feed),
            scope,
            config: SyncConfig::default(),
            relations: Arc::new(RelationCache::new()),
            snapshot: Arc::new(snapshot),
            lifecycle: Lifecycle::Idle,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a relation cache shared with other managers.
    #[must_use]
    pub fn with_relations(mut self, relations: Arc<RelationCache>) -> Self {
        self.relations = relations;
        self
    }

    /// Subscribe, load the initial set and begin applying changes.
    ///
    /// Calling `start` on a running or disposed manager does nothing.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => {
                debug!(scope = ?self.scope.route_id, "sync manager already running");
                return;
            }
            Lifecycle::Disposed => {
                warn!(scope = ?self.scope.route_id, "start called on disposed sync manager");
                return;
            }
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            feed: Arc::clone(&self.feed),
            channel: format!("{}:{}", self.scope.channel_name(), Uuid::new_v4()),
            scope: self.scope.clone(),
            config: self.config,
            relations: Arc::clone(&self.relations),
            snapshot: Arc::clone(&self.snapshot),
            store: VehicleStore::new(),
            published: None,
            connection: ConnectionState::Connecting,
            loading: true,
            last_error: None,
            backoff: self.config.backoff(),
            generation: 0,
            subscription: None,
            reconnect_at: None,
            feed_tx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(worker.run(commands_rx, feed_rx));

        self.lifecycle = Lifecycle::Running(Running { commands: commands_tx, shutdown: shutdown_tx, task });
    }

    /// Force a full reconciliation and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when the reconciliation fails, or
    /// [`Error::Disposed`] when the manager is not running.
    pub async fn refetch(&self) -> Result<()> {
        let Lifecycle::Running(running) = &self.lifecycle else {
            return Err(Error::Disposed);
        };

        let (tx, rx) = oneshot::channel();
        if running.commands.send(Command::Refetch(tx)).is_err() {
            return Err(Error::Disposed);
        }
        rx.await.unwrap_or(Err(Error::Disposed))
    }

    /// Close the subscription and stop all timers and pending work. Once
    /// this returns no further snapshot will be published. Safe to call
    /// more than once.
    pub async fn dispose(&mut self) {
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Disposed);
        let Lifecycle::Running(running) = lifecycle else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(err) = running.task.await {
            warn!(error = %err, "sync worker ended abnormally");
        }
        info!(scope = ?self.scope.route_id, "sync manager disposed");
    }

    /// Receiver for snapshot updates.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshot.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Current active vehicles, ordered by trip id.
    #[must_use]
    pub fn vehicles(&self) -> Vec<VehicleRecord> {
        self.snapshot.borrow().vehicles.to_vec()
    }

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        self.snapshot.borrow().connection
    }

    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub const fn relations(&self) -> &Arc<RelationCache> {
        &self.relations
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Disposed)
    }
}

impl<F: ChangeFeed> Drop for SyncManager<F> {
    fn drop(&mut self) {
        if let Lifecycle::Running(running) = &self.lifecycle {
            let _ = running.shutdown.send(true);
        }
    }
}

struct Worker<F: ChangeFeed> {
    feed: Arc<F>,
    channel: String,
    scope: Scope,
    config: SyncConfig,
    relations: Arc<RelationCache>,
    snapshot: Arc<watch::Sender<FleetSnapshot>>,
    store: VehicleStore,
    // store revision and vehicle list last handed to consumers
    published: Option<(u64, Arc<[VehicleRecord]>)>,
    connection: ConnectionState,
    loading: bool,
    last_error: Option<Error>,
    backoff: Backoff,
    generation: u64,
    subscription: Option<Box<dyn Subscription>>,
    reconnect_at: Option<Instant>,
    feed_tx: mpsc::UnboundedSender<Envelope>,
    shutdown: watch::Receiver<bool>,
}

impl<F: ChangeFeed> Worker<F> {
    async fn run(
        mut self, mut commands: mpsc::UnboundedReceiver<Command>,
        mut feed_rx: mpsc::UnboundedReceiver<Envelope>,
    ) {
        info!(channel = %self.channel, "starting position sync");
        self.connect().await;

        let period = self.config.reconcile_period();
        if period != self.config.reconcile_interval {
            warn!(
                configured = ?self.config.reconcile_interval,
                period = ?period,
                "reconcile interval too short, clamping"
            );
        }
        let mut reconcile = time::interval_at(Instant::now() + period, period);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.disposed() {
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,
                command = commands.recv() => match command {
                    Some(Command::Refetch(reply)) => {
                        let result = self.reconcile("refetch").await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                Some(envelope) = feed_rx.recv() => self.on_envelope(envelope).await,
                () = time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect().await;
                }
                _ = reconcile.tick() => {
                    let _ = self.reconcile("interval").await;
                }
            }
        }

        self.close_subscription();
        info!(channel = %self.channel, "position sync stopped");
    }

    fn disposed(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    // ----------------------------------------------------------------------
    // Connection lifecycle
    // ----------------------------------------------------------------------

    async fn connect(&mut self) {
        self.close_subscription();
        self.generation += 1;
        self.connection = ConnectionState::Connecting;
        self.publish();

        let sink = FeedSink::new(self.channel.clone(), self.generation, self.feed_tx.clone());
        let feed = Arc::clone(&self.feed);
        let scope = self.scope.clone();
        let Some(subscribed) = guarded(&mut self.shutdown, feed.subscribe(&scope, sink)).await else {
            return;
        };

        match subscribed {
            Ok(subscription) => {
                debug!(channel = %self.channel, generation = self.generation, "subscription opened");
                self.subscription = Some(subscription);
            }
            Err(err) => {
                let err = Error::from(err.context("opening change stream"));
                warn!(channel = %self.channel, error = %err, "failed to subscribe");
                self.last_error = Some(err);
                self.fail(ConnectionState::Error);
            }
        }

        // the initial set loads even when the change stream is down
        let _ = self.reconcile("connect").await;
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        info!(
            monotonic_counter.sync_reconnects = 1,
            channel = %self.channel,
            attempt = self.backoff.attempt(),
            "reconnecting change stream"
        );
        self.connect().await;
    }

    /// Drop the current subscription and schedule a reconnect, unless one is
    /// already pending.
    fn fail(&mut self, state: ConnectionState) {
        self.close_subscription();
        // anything the failed subscription still delivers is stale
        self.generation += 1;
        self.connection = state;

        if self.reconnect_at.is_none() {
            let delay = self.backoff.next_delay();
            self.reconnect_at = Some(Instant::now() + delay);
            warn!(
                channel = %self.channel,
                attempt = self.backoff.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "change stream {state}, scheduling reconnect"
            );
        }
        self.publish();
    }

    fn close_subscription(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    // ----------------------------------------------------------------------
    // Feed messages
    // ----------------------------------------------------------------------

    async fn on_envelope(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation {
            debug!(
                generation = envelope.generation,
                current = self.generation,
                "dropping message from superseded subscription"
            );
            return;
        }

        match envelope.message {
            FeedMessage::Status(status) => self.on_status(status),
            FeedMessage::Change(event) => self.on_change(event).await,
        }
    }

    fn on_status(&mut self, status: ChannelStatus) {
        match status {
            ChannelStatus::Subscribed => {
                info!(channel = %self.channel, "change stream subscribed");
                self.connection = ConnectionState::Connected;
                self.backoff.reset();
                self.reconnect_at = None;
                self.publish();
            }
            ChannelStatus::ChannelError | ChannelStatus::TimedOut => {
                self.last_error = Some(Error::Transport(format!("channel {}: {status}", self.channel)));
                self.fail(ConnectionState::Error);
            }
            ChannelStatus::Closed => self.fail(ConnectionState::Disconnected),
        }
    }

    async fn on_change(&mut self, event: ChangeEvent) {
        debug!(kind = event.kind(), trip_id = ?event.trip_id(), "applying change");
        match event {
            ChangeEvent::Insert { new } => self.apply_insert(new).await,
            ChangeEvent::Update { new } => self.apply_update(new).await,
            ChangeEvent::Delete { old } => self.apply_delete(old).await,
        }
    }

    async fn apply_insert(&mut self, record: VehicleRecord) {
        if !self.scope.matches_route(&record.route_id) {
            debug!(trip_id = %record.id, route_id = %record.route_id, "insert outside route filter");
            return;
        }
        if self.store.contains(&record.id) {
            debug!(trip_id = %record.id, "insert for known trip ignored");
            return;
        }

        let feed = Arc::clone(&self.feed);
        let trip_id = record.id.clone();
        let Some(fetched) = guarded(&mut self.shutdown, feed.fetch_trip(&trip_id)).await else {
            return;
        };

        let full = match fetched {
            Ok(Some(full)) => {
                self.relations.absorb(&full);
                full
            }
            Ok(None) => {
                debug!(%trip_id, "inserted trip no longer exists");
                return;
            }
            Err(err) => {
                warn!(%trip_id, error = %err, "failed to fetch inserted trip, using event payload");
                let mut record = record;
                self.relations.resolve(&mut record);
                record
            }
        };

        if !self.scope.contains(&full) {
            debug!(%trip_id, status = ?full.status, "inserted trip not in scope");
            return;
        }
        if self.store.insert(full) {
            info!(monotonic_counter.sync_trips_added = 1, %trip_id, "trip added");
            self.publish();
        }
    }

    async fn apply_update(&mut self, record: VehicleRecord) {
        if !self.scope.contains(&record) {
            if self.store.remove(&record.id).is_some() {
                info!(trip_id = %record.id, status = ?record.status, "trip left active set");
                self.publish();
            }
            return;
        }

        let Some(existing) = self.store.get_mut(&record.id) else {
            debug!(trip_id = %record.id, "update for unknown trip, treating as insert");
            return self.apply_insert(record).await;
        };
        existing.patch_scalars(&record);
        self.relations.resolve(existing);
        self.publish();
    }

    async fn apply_delete(&mut self, old: OldRecord) {
        let Some(trip_id) = old.id else {
            warn!(
                monotonic_counter.sync_malformed_deletes = 1,
                channel = %self.channel,
                "delete without trip id, reconciling"
            );
            let _ = self.reconcile("malformed_delete").await;
            return;
        };

        if self.store.remove(&trip_id).is_some() {
            info!(%trip_id, "trip removed");
            self.publish();
        } else {
            debug!(%trip_id, "delete for unknown trip ignored");
        }
    }

    // ----------------------------------------------------------------------
    // Reconciliation
    // ----------------------------------------------------------------------

    /// Replace the set with a full fetch. On failure the previous set is kept.
    async fn reconcile(&mut self, reason: &'static str) -> Result<()> {
        self.loading = true;
        self.publish();

        let feed = Arc::clone(&self.feed);
        let scope = self.scope.clone();
        let Some(fetched) = guarded(&mut self.shutdown, feed.fetch_active(&scope)).await else {
            return Err(Error::Disposed);
        };
        self.loading = false;

        let records = match fetched.context("fetching active trips") {
            Ok(records) => records,
            Err(err) => {
                let err = Error::from(err);
                warn!(reason, error = %err, "reconciliation failed, keeping previous set");
                self.last_error = Some(err.clone());
                self.publish();
                return Err(err);
            }
        };

        for record in &records {
            self.relations.absorb(record);
        }
        let outcome = self.store.replace_all(records.into_iter().filter(|r| self.scope.contains(r)));
        self.last_error = None;

        info!(
            monotonic_counter.sync_reconciliations = 1,
            reason,
            vehicles = outcome.total,
            added = outcome.added,
            removed = outcome.removed,
            "active set reconciled"
        );
        self.publish();
        Ok(())
    }

    /// Publish the current state. The vehicle list is only rebuilt when the
    /// store changed since the last publish.
    fn publish(&mut self) {
        let revision = self.store.revision();
        let cached = self
            .published
            .as_ref()
            .filter(|(published, _)| *published == revision)
            .map(|(_, vehicles)| Arc::clone(vehicles));
        let vehicles = if let Some(vehicles) = cached {
            vehicles
        } else {
            let vehicles: Arc<[VehicleRecord]> = self.store.to_vec().into();
            self.published = Some((revision, Arc::clone(&vehicles)));
            vehicles
        };

        let loading = self.loading;
        let connection = self.connection;
        let reconnect_attempt = self.backoff.attempt();
        let last_error = &self.last_error;

        self.snapshot.send_if_modified(|current| {
            let unchanged = Arc::ptr_eq(&current.vehicles, &vehicles)
                && current.loading == loading
                && current.connection == connection
                && current.reconnect_attempt == reconnect_attempt
                && current.last_error == *last_error;
            if unchanged {
                return false;
            }
            *current = FleetSnapshot {
                vehicles,
                loading,
                last_error: last_error.clone(),
                connection,
                reconnect_attempt,
            };
            true
        });
    }
}

/// Run `fut` unless shutdown is signalled first. In-flight results are
/// discarded once the manager is disposed.
async fn guarded<T>(shutdown: &mut watch::Receiver<bool>, fut: impl Future<Output = T>) -> Option<T> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => None,
        out = fut => Some(out),
    }
}
