//! Fan-out of polled observations to live subscribers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use pricecast_core::{CurrencyFilter, PriceObservation, SourceError, DEFAULT_QUEUE_CAPACITY};
use pricecast_store::HistoricalStore;

use crate::registry::{PublishReport, Registry, SubscriptionId};
use crate::subscription::Subscription;

/// Broadcaster configuration
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Pending live observations per subscriber before drops start
    pub queue_capacity: usize,
    /// Source errors retained for slow error listeners
    pub error_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_capacity: 16,
        }
    }
}

/// Owns the subscription registry and the path from producer to consumers
pub struct Broadcaster {
    config: BroadcasterConfig,
    registry: Arc<Registry>,
    store: Arc<dyn HistoricalStore>,
    errors: broadcast::Sender<Arc<SourceError>>,

    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    source_errors: AtomicU64,
}

impl Broadcaster {
    pub fn new(store: Arc<dyn HistoricalStore>) -> Self {
        Self::with_config(BroadcasterConfig::default(), store)
    }

    pub fn with_config(config: BroadcasterConfig, store: Arc<dyn HistoricalStore>) -> Self {
        let (errors, _) = broadcast::channel(config.error_capacity.max(1));

        Self {
            config,
            registry: Arc::new(Registry::new()),
            store,
            errors,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
        }
    }

    /// Register a subscriber with no extra currencies
    pub fn register(&self) -> Subscription {
        self.register_filtered(CurrencyFilter::new())
    }

    /// Register a subscriber; live delivery starts with the next publish
    pub fn register_filtered(&self, filter: CurrencyFilter) -> Subscription {
        let id = SubscriptionId::generate();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));

        self.registry.insert(id, tx);
        debug!(subscription = %id, subscribers = self.registry.len(), "Subscription registered");

        Subscription::new(id, filter, rx, Arc::downgrade(&self.registry))
    }

    /// Remove a subscriber. Unknown or already removed ids are a no-op.
    pub fn deregister(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscription = %id, subscribers = self.registry.len(), "Subscription deregistered");
        }
        removed
    }

    /// Offer one observation to every subscriber without blocking
    pub fn publish(&self, observation: impl Into<Arc<PriceObservation>>) -> PublishReport {
        let observation = observation.into();
        let report = self.registry.fan_out(&observation);

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);

        if report.dropped > 0 {
            warn!(
                dropped = report.dropped,
                delivered = report.delivered,
                "Slow subscribers missed an observation"
            );
        }

        report
    }

    /// Stage everything newer than `since` ahead of the subscription's live
    /// traffic. Query failures are logged and leave the subscription live-only.
    ///
    /// Call after registering so nothing published in between is missed.
    pub async fn replay_backlog(&self, subscription: &mut Subscription, since: i64) -> usize {
        match self.store.get_since(since).await {
            Ok(mut backlog) => {
                backlog.sort_by_key(|o| o.timestamp());
                let count = backlog.len();
                subscription.stage_backlog(backlog);
                info!(subscription = %subscription.id(), since, count, "Backlog staged");
                count
            }
            Err(e) => {
                warn!(subscription = %subscription.id(), since, error = %e, "Backlog query failed, continuing live only");
                0
            }
        }
    }

    /// Record a price source failure and pass it to error listeners
    pub fn report_error(&self, error: SourceError) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "Price source error");
        // No listeners is fine
        let _ = self.errors.send(Arc::new(error));
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<SourceError>> {
        self.errors.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_registered(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            subscribers: self.registry.len(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }
}

/// Broadcaster statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub source_errors: u64,
}
