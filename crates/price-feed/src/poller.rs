//! Fixed-interval price poller
//!
//! `Waiting` until the next tick, `Fetching` while one call to the source is
//! in flight, `Stopped` once the shutdown signal fires. Every tick is one
//! attempt: no backoff, no retries beyond the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use pricecast_broadcast::Broadcaster;
use pricecast_store::HistoricalStore;

use crate::source::PriceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Waiting,
    Fetching,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct PollerCounters {
    ticks: AtomicU64,
    fetched: AtomicU64,
    fetch_errors: AtomicU64,
    persist_errors: AtomicU64,
}

/// Poller statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    pub fetched: u64,
    pub fetch_errors: u64,
    pub persist_errors: u64,
}

/// Read-only view of a poller that has been moved into its task
#[derive(Debug, Clone)]
pub struct PollerHandle {
    state: Arc<RwLock<PollerState>>,
    counters: Arc<PollerCounters>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.read()
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats {
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            fetched: self.counters.fetched.load(Ordering::Relaxed),
            fetch_errors: self.counters.fetch_errors.load(Ordering::Relaxed),
            persist_errors: self.counters.persist_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct Poller {
    config: PollerConfig,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn HistoricalStore>,
    broadcaster: Arc<Broadcaster>,
    handle: PollerHandle,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn HistoricalStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            broadcaster,
            handle: PollerHandle {
                state: Arc::new(RwLock::new(PollerState::Waiting)),
                counters: Arc::new(PollerCounters::default()),
            },
        }
    }

    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PollerState {
        self.handle.state()
    }

    fn set_state(&self, state: PollerState) {
        *self.handle.state.write() = state;
    }

    /// Poll until `shutdown` becomes true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval;
        info!(source = self.source.name(), interval = ?period, "Starting price poller");

        // First poll one full interval after start
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                _ = interval.tick() => {
                    self.set_state(PollerState::Fetching);
                    tokio::select! {
                        biased;
                        _ = stop_requested(&mut shutdown) => break,
                        _ = self.poll_once() => {}
                    }
                    self.set_state(PollerState::Waiting);
                }
            }
        }

        self.set_state(PollerState::Stopped);
        info!(stats = ?self.handle.stats(), "Price poller stopped");
    }

    /// One fetch, persist, publish cycle
    pub async fn poll_once(&self) {
        let counters = &self.handle.counters;
        counters.ticks.fetch_add(1, Ordering::Relaxed);

        let observation = match self.source.get_price().await {
            Ok(observation) => observation,
            Err(e) => {
                counters.fetch_errors.fetch_add(1, Ordering::Relaxed);
                self.broadcaster.report_error(e);
                return;
            }
        };
        counters.fetched.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.store.create(&observation).await {
            counters.persist_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, timestamp = observation.timestamp(), "Failed to persist observation");
        }

        let report = self.broadcaster.publish(observation);
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Published observation"
        );
    }
}

/// Resolves once the flag is true or its sender is gone
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
