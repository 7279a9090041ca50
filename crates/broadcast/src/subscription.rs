//! Subscription handle
//!
//! Owned by the task that serves one connection. Yields staged backlog
//! first, then live observations in publish order. Dropping the handle
//! removes it from the registry, so every exit path of a delivery loop
//! (including a panic unwinding through it) deregisters.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use pricecast_core::{project, CurrencyFilter, PriceMessage, PriceObservation};

use crate::registry::{Registry, SubscriptionId};

pub struct Subscription {
    id: SubscriptionId,
    filter: CurrencyFilter,
    /// Replayed history, then whatever was already queued live when it was staged
    backlog: VecDeque<Arc<PriceObservation>>,
    live: mpsc::Receiver<Arc<PriceObservation>>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        filter: CurrencyFilter,
        live: mpsc::Receiver<Arc<PriceObservation>>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            filter,
            backlog: VecDeque::new(),
            live,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn filter(&self) -> &CurrencyFilter {
        &self.filter
    }

    /// Staged items not yet yielded
    pub fn pending_backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Queue ascending historical items ahead of all live traffic
    ///
    /// Live items already queued at this point were published while the
    /// history was being read; those not newer than the last replayed item
    /// are the same observations and are discarded. Anything published
    /// afterwards is delivered untouched.
    pub(crate) fn stage_backlog(&mut self, items: Vec<PriceObservation>) {
        let Some(newest) = items.last().map(PriceObservation::timestamp) else {
            return;
        };
        self.backlog.extend(items.into_iter().map(Arc::new));

        while let Ok(queued) = self.live.try_recv() {
            if queued.timestamp() <= newest {
                debug!(subscription = %self.id, timestamp = queued.timestamp(), "Skipping live item already replayed");
                continue;
            }
            self.backlog.push_back(queued);
        }
    }

    /// Next observation; `None` once deregistered and drained
    pub async fn recv(&mut self) -> Option<Arc<PriceObservation>> {
        if let Some(item) = self.backlog.pop_front() {
            return Some(item);
        }

        self.live.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Result<Arc<PriceObservation>, TryRecvError> {
        if let Some(item) = self.backlog.pop_front() {
            return Ok(item);
        }

        self.live.try_recv()
    }

    /// Project through this subscriber's currency filter
    pub fn project(&self, observation: &PriceObservation) -> PriceMessage {
        project(observation, &self.filter)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!(subscription = %self.id, "Subscription released");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("pending_backlog", &self.backlog.len())
            .finish()
    }
}
