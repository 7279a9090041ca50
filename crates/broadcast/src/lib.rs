//! Subscriber fan-out for live price observations
//!
//! Features:
//! - One producer, any number of independent consumers
//! - Non-blocking publish: a full subscriber queue drops that subscriber's copy
//! - Backlog replay from the historical store ahead of live traffic
//! - Deregistration tied to the subscription handle's lifetime

pub mod registry;
pub mod subscription;
pub mod broadcaster;

pub use broadcaster::{BroadcastStats, Broadcaster, BroadcasterConfig};
pub use registry::{PublishReport, SubscriptionId};
pub use subscription::Subscription;
