//! Subscription registry
//!
//! The only shared mutable state in the fan-out path. One lock guards the
//! map; it is held for insert, remove, and the iterate-and-try-enqueue pass
//! of a publish. Enqueues never wait, so hold time does not depend on how
//! fast any consumer reads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use pricecast_core::PriceObservation;

pub(crate) type LiveSender = mpsc::Sender<Arc<PriceObservation>>;

/// Identity issued at registration and used for deregistration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one publish across all subscriptions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Entries whose receiver was already gone
    pub pruned: usize,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<SubscriptionId, LiveSender>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: SubscriptionId, sender: LiveSender) {
        self.entries.lock().insert(id, sender);
    }

    /// Returns whether the id was present
    pub fn remove(&self, id: SubscriptionId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Offer one observation to every queue without waiting on any of them
    pub fn fan_out(&self, observation: &Arc<PriceObservation>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut entries = self.entries.lock();

        entries.retain(|id, sender| match sender.try_send(Arc::clone(observation)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                debug!(subscription = %id, "Queue full, dropping observation");
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.pruned += 1;
                debug!(subscription = %id, "Receiver gone, pruning subscription");
                false
            }
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pricecast_core::Currency;

    fn observation() -> Arc<PriceObservation> {
        Arc::new(PriceObservation::new(
            Utc.timestamp_opt(0, 0).unwrap(),
            "",
            "",
            [(Currency::Usd, 1.0)],
        ))
    }

    #[test]
    fn test_fan_out_counts() {
        let registry = Registry::new();

        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(observation()).unwrap();
        let (open_tx, mut open_rx) = mpsc::channel(4);
        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);

        registry.insert(SubscriptionId::generate(), full_tx);
        registry.insert(SubscriptionId::generate(), open_tx);
        registry.insert(SubscriptionId::generate(), closed_tx);

        let report = registry.fan_out(&observation());
        assert_eq!(report, PublishReport { delivered: 1, dropped: 1, pruned: 1 });
        assert_eq!(registry.len(), 2);
        assert!(open_rx.try_recv().is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let id = SubscriptionId::generate();
        let (tx, _rx) = mpsc::channel(1);
        registry.insert(id, tx);

        assert!(registry.contains(id));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!registry.remove(SubscriptionId::generate()));
        assert!(registry.is_empty());
    }
}
