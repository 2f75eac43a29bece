//! Periodic reconciliation of manifests and recent data.
//!
//! The scheduler is an explicit recurring task, not an ambient callback: it
//! is spawned with [`ReconcileScheduler::spawn`], returns a handle, and is
//! shut down deliberately. It wakes on a fixed interval and on [`poke`]
//! (reconnect or visibility-restored events), re-fetches each registered
//! dataset's manifest, and - only when the manifest generation advanced -
//! re-fetches the trailing recent window and publishes refreshed results to
//! subscribers. Closed historical partitions are never touched here; they
//! are immutable and only re-enter the network path via a cache miss.
//!
//! [`poke`]: ReconcileHandle::poke

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::manifest::CalendarDate;
use crate::query::QueryEngine;
use crate::resolve::DateRange;

/// Default reconciliation interval.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default trailing window re-fetched when a manifest advances, in days.
/// Matches the width of the open "current" partition.
const DEFAULT_RECENT_WINDOW_DAYS: u32 = 30;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Fixed interval between reconciliation runs.
    pub interval: Duration,
    /// Width of the trailing window to re-fetch, in days.
    pub recent_window_days: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
        }
    }
}

/// Spawns and owns the recurring reconciliation task.
pub struct ReconcileScheduler;

impl ReconcileScheduler {
    /// Spawns the reconciliation task on the current tokio runtime.
    ///
    /// The task idles until the first interval tick or poke; it does not
    /// reconcile immediately on spawn.
    #[must_use]
    pub fn spawn(engine: Arc<QueryEngine>, config: ReconcileConfig) -> ReconcileHandle {
        let poke = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            engine,
            config,
            Arc::clone(&poke),
            shutdown_rx,
        ));

        ReconcileHandle {
            poke,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running reconciliation task.
pub struct ReconcileHandle {
    poke: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcileHandle {
    /// Triggers an immediate reconciliation run, e.g. on reconnect or
    /// visibility-restored events. Pokes coalesce: several while a run is
    /// in progress result in a single follow-up run.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Signals the task to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            if !err.is_cancelled() {
                warn!(error = %err, "reconcile task ended abnormally");
            }
        }
    }
}

async fn run(
    engine: Arc<QueryEngine>,
    config: ReconcileConfig,
    poke: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval() fires immediately; consume that tick so the first run
    // waits a full period (registration already fetched fresh data).
    ticker.tick().await;

    info!(interval = ?config.interval, "reconcile scheduler started");
    loop {
        tokio::select! {
            _ = ticker.tick() => debug!("interval reconcile"),
            () = poke.notified() => debug!("poked reconcile"),
            _ = shutdown.changed() => {
                info!("reconcile scheduler stopped");
                return;
            }
        }
        reconcile_once(&engine, &config).await;
    }
}

/// One reconciliation pass over every registered dataset.
#[instrument(skip(engine, config))]
async fn reconcile_once(engine: &QueryEngine, config: &ReconcileConfig) {
    let today = CalendarDate::from_timestamp(OffsetDateTime::now_utc());
    let window = DateRange::new(
        today.minus_days(config.recent_window_days),
        today.plus_days(1),
    );

    for dataset in engine.datasets() {
        match engine.refresh_manifest(&dataset).await {
            Ok(refresh) if refresh.advanced => {
                match engine.refresh_window(&dataset, window).await {
                    Ok(notified) => {
                        info!(dataset = %dataset, notified, "published refreshed window");
                    }
                    Err(err) => {
                        warn!(dataset = %dataset, error = %err, "window refresh failed");
                    }
                }
            }
            Ok(_) => debug!(dataset = %dataset, "manifest unchanged, nothing to publish"),
            Err(err) => warn!(dataset = %dataset, error = %err, "manifest refresh failed"),
        }
    }
}
