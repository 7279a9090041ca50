//! Logging setup and periodic stats reporting

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricecast_broadcast::Broadcaster;
use pricecast_feed::PollerHandle;

use crate::stop_requested;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format for log aggregation
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}

/// Log broadcaster and poller counters every `every` until shutdown
pub async fn report_stats(
    broadcaster: Arc<Broadcaster>,
    poller: PollerHandle,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval_at(time::Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            _ = interval.tick() => {
                let fanout = broadcaster.stats();
                let polling = poller.stats();
                info!(
                    subscribers = fanout.subscribers,
                    published = fanout.published,
                    delivered = fanout.delivered,
                    dropped = fanout.dropped,
                    source_errors = fanout.source_errors,
                    ticks = polling.ticks,
                    persist_errors = polling.persist_errors,
                    state = ?poller.state(),
                    "stats"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_feed::{CoinDeskSource, Poller, PollerConfig};
    use pricecast_store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_report_stats_runs_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let broadcaster = Arc::new(Broadcaster::new(store.clone()));
        let source = CoinDeskSource::new("http://127.0.0.1:9/", Duration::from_secs(1)).unwrap();
        let poller = Poller::new(PollerConfig::default(), Arc::new(source), store, Arc::clone(&broadcaster));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(report_stats(
            broadcaster,
            poller.handle(),
            Duration::from_secs(60),
            shutdown_rx,
        ));

        // Several reporting periods pass without ending the task
        time::sleep(Duration::from_secs(150)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(false).unwrap();
        time::sleep(Duration::from_secs(61)).await;
        assert!(!task.is_finished());

        shutdown_tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[test]
    fn test_log_format_flag() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Pretty);
    }
}
