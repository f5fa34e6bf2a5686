//! Position tracker: polls the target account and notifies listeners
//! when its open positions change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::models::AccountSnapshot;

use super::change::snapshot_changed;

/// Hard floor for the poll cadence.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Source of account snapshots. Implemented by the Data API client; tests
/// substitute scripted sources.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, address: &str) -> Result<AccountSnapshot>;
}

/// Receives tracker notifications.
///
/// Listeners are awaited inside the poll cycle, so a slow listener delays
/// the next accepted poll rather than running concurrently with it.
#[async_trait]
pub trait TrackerListener: Send + Sync {
    /// Called with each accepted (changed) snapshot.
    async fn on_update(&self, snapshot: &AccountSnapshot);

    /// Called when a poll or on-demand fetch fails.
    async fn on_error(&self, _error: &anyhow::Error) {}
}

/// Freshly built status returned by [`PositionTracker::get_status`].
#[derive(Debug, Clone)]
pub struct TrackerStatus {
    pub snapshot: AccountSnapshot,
    pub is_monitoring: bool,
    pub last_poll_at: Option<DateTime<Utc>>,
}

/// Polls a target account's open positions on a fixed cadence.
///
/// One immediate poll runs inside `start()`, then a background task ticks
/// at the configured interval. A tick is skipped entirely while a previous
/// poll is still in flight, so polls never overlap and listener cycles run
/// in poll-arrival order.
pub struct PositionTracker {
    source: Arc<dyn SnapshotSource>,
    address: String,
    poll_interval: Duration,

    listeners: RwLock<Vec<Arc<dyn TrackerListener>>>,
    last_snapshot: RwLock<Option<AccountSnapshot>>,
    last_poll_at: RwLock<Option<DateTime<Utc>>>,
    stop_tx: RwLock<Option<watch::Sender<bool>>>,

    running: AtomicBool,
    poll_in_flight: AtomicBool,
}

impl PositionTracker {
    pub fn new(source: Arc<dyn SnapshotSource>, address: String, poll_interval: Duration) -> Self {
        Self {
            source,
            address,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            listeners: RwLock::new(Vec::new()),
            last_snapshot: RwLock::new(None),
            last_poll_at: RwLock::new(None),
            stop_tx: RwLock::new(None),
            running: AtomicBool::new(false),
            poll_in_flight: AtomicBool::new(false),
        }
    }

    /// Register a listener. Call before `start()`.
    pub async fn add_listener(&self, listener: Arc<dyn TrackerListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Address of the tracked account.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Last accepted snapshot, if any poll has succeeded yet.
    pub async fn last_snapshot(&self) -> Option<AccountSnapshot> {
        self.last_snapshot.read().await.clone()
    }

    /// Start monitoring: one immediate poll, then the recurring schedule.
    ///
    /// Calling while already running is a warning-level no-op.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(address = %self.address, "Position tracker already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.write().await = Some(stop_tx);

        info!(
            address = %self.address,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting position tracker"
        );

        // First cycle runs inline so callers observe an initial state
        // before the schedule takes over.
        self.poll_once().await;

        let tracker = Arc::clone(&self);
        tokio::spawn(async move {
            tracker.run_schedule(stop_rx).await;
        });

        Ok(())
    }

    /// Stop monitoring. Idempotent; an in-flight poll runs to completion.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(stop_tx) = self.stop_tx.write().await.take() {
            let _ = stop_tx.send(true);
        }

        info!(address = %self.address, "Position tracker stopped");
    }

    /// Fetch the account state on demand and build a fresh status.
    ///
    /// Stored tracker state is not touched. A fetch failure notifies error
    /// listeners and propagates to the caller.
    pub async fn get_status(&self) -> Result<TrackerStatus> {
        match self.source.fetch_snapshot(&self.address).await {
            Ok(snapshot) => Ok(TrackerStatus {
                snapshot,
                is_monitoring: self.is_running(),
                last_poll_at: *self.last_poll_at.read().await,
            }),
            Err(error) => {
                warn!(address = %self.address, error = %error, "Status fetch failed");
                self.notify_error(&error).await;
                Err(error)
            }
        }
    }

    /// Recurring schedule driven by `start()`.
    async fn run_schedule(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        // The first tick of a fresh interval completes immediately and the
        // initial poll has already run; consume it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    if self.poll_in_flight.swap(true, Ordering::SeqCst) {
                        debug!(address = %self.address, "Previous poll still in flight, skipping tick");
                        continue;
                    }

                    let tracker = Arc::clone(&self);
                    tokio::spawn(async move {
                        tracker.poll_once().await;
                        tracker.poll_in_flight.store(false, Ordering::SeqCst);
                    });
                }
            }
        }

        debug!(address = %self.address, "Poll schedule exited");
    }

    /// One fetch/detect/notify cycle.
    ///
    /// Fetch failures leave the stored snapshot untouched (stale but valid)
    /// and never terminate the schedule; the next tick retries on its own.
    async fn poll_once(&self) {
        let snapshot = match self.source.fetch_snapshot(&self.address).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(address = %self.address, error = %error, "Failed to fetch target positions");
                self.notify_error(&error).await;
                return;
            }
        };

        *self.last_poll_at.write().await = Some(Utc::now());

        let changed = match self.last_snapshot.read().await.as_ref() {
            Some(prior) => snapshot_changed(prior, &snapshot),
            None => true,
        };

        if !changed {
            debug!(address = %self.address, "No material change in target positions");
            return;
        }

        info!(
            address = %self.address,
            positions = snapshot.position_count(),
            total_value = %snapshot.total_value,
            "Target positions changed"
        );

        *self.last_snapshot.write().await = Some(snapshot.clone());

        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.on_update(&snapshot).await;
        }
    }

    async fn notify_error(&self, error: &anyhow::Error) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.on_error(error).await;
        }
    }
}
