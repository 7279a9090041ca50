//! Price polling
//!
//! Features:
//! - HTTP price source with a bounded per-call timeout
//! - Fixed-interval poller that persists then publishes each observation
//! - Source failures reported to the broadcaster, never fatal

pub mod source;
pub mod poller;

pub use poller::{Poller, PollerConfig, PollerHandle, PollerState, PollerStats};
pub use source::{parse_coindesk, CoinDeskSource, PriceSource};
