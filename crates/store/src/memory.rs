//! In-process store

use async_trait::async_trait;
use parking_lot::RwLock;

use pricecast_core::{PersistedObservation, PriceObservation, StoreResult};

use crate::HistoricalStore;

/// Keeps the persisted form in memory, so reads see the same lossy
/// projection a durable backend would return
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<PersistedObservation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Records newer than `since`, ascending by key
pub(crate) fn select_since(records: &[PersistedObservation], since: i64) -> Vec<PriceObservation> {
    let mut selected: Vec<PersistedObservation> = records
        .iter()
        .filter(|r| r.created_at > since)
        .cloned()
        .collect();
    selected.sort_by_key(|r| r.created_at);
    selected.into_iter().map(PriceObservation::from).collect()
}

#[async_trait]
impl HistoricalStore for MemoryStore {
    async fn create(&self, observation: &PriceObservation) -> StoreResult<()> {
        self.records.write().push(PersistedObservation::from(observation));
        Ok(())
    }

    async fn get_since(&self, since: i64) -> StoreResult<Vec<PriceObservation>> {
        Ok(select_since(&self.records.read(), since))
    }
}
