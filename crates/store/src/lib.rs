//! Historical price store
//!
//! Append-only log of past observations, queried by a lower-bound
//! timestamp. Two backends:
//! - `memory://` keeps everything in process (default, tests)
//! - `file:///dir` appends JSON Lines to `<dir>/<db_name>.jsonl`

pub mod memory;
pub mod file;

use std::sync::Arc;

use async_trait::async_trait;
use pricecast_core::{PriceObservation, StoreError, StoreResult};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Durable log of observations
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// Append one observation
    async fn create(&self, observation: &PriceObservation) -> StoreResult<()>;

    /// Observations strictly newer than `since` (epoch seconds), ascending
    async fn get_since(&self, since: i64) -> StoreResult<Vec<PriceObservation>>;
}

/// Open the store named by `uri`
pub async fn open_store(uri: &str, db_name: &str) -> StoreResult<Arc<dyn HistoricalStore>> {
    if uri == "memory://" || uri == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    if let Some(dir) = uri.strip_prefix("file://") {
        if dir.is_empty() {
            return Err(StoreError::UnsupportedUri(uri.to_string()));
        }
        let store = FileStore::open(dir, db_name).await?;
        return Ok(Arc::new(store));
    }

    Err(StoreError::UnsupportedUri(uri.to_string()))
}
