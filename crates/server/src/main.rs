//! pricecast
//!
//! Polls the BTC price on a fixed interval, stores every observation and
//! streams them to WebSocket and gRPC subscribers.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use pricecast_broadcast::{Broadcaster, BroadcasterConfig};
use pricecast_core::ServiceConfig;
use pricecast_feed::{CoinDeskSource, Poller, PollerConfig};
use pricecast_server::telemetry::{self, LogFormat};
use pricecast_server::{GrpcServerBuilder, PricesServiceImpl, WsServer};
use pricecast_store::open_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = ServiceConfig::load().context("loading configuration")?;
    telemetry::init_logging(&config.log_level, LogFormat::from_json_flag(config.log_json))?;

    info!("Starting pricecast v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config.store_uri, &config.db_name)
        .await
        .with_context(|| format!("opening historical store '{}'", config.store_uri))?;

    let broadcaster = Arc::new(Broadcaster::with_config(
        BroadcasterConfig {
            queue_capacity: config.queue_capacity,
            ..Default::default()
        },
        Arc::clone(&store),
    ));

    let source = Arc::new(CoinDeskSource::new(
        config.source_url.as_str(),
        config.source_timeout(),
    )?);
    let poller = Poller::new(
        PollerConfig {
            interval: config.fetch_interval(),
        },
        source,
        store,
        Arc::clone(&broadcaster),
    );
    let poller_handle = poller.handle();

    // Bind before spawning anything so a busy port fails startup
    let ws_addr = config.listen_addr()?;
    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("binding WebSocket listener on {ws_addr}"))?;
    let grpc_listener = if config.grpc_enabled {
        let grpc_addr = config.grpc_addr()?;
        let listener = TcpListener::bind(grpc_addr)
            .await
            .with_context(|| format!("binding gRPC listener on {grpc_addr}"))?;
        Some(listener)
    } else {
        info!("gRPC server disabled");
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Spawn shutdown signal handler
    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            wait_for_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    let poller_task = tokio::spawn(poller.run(shutdown_rx.clone()));
    let stats_task = tokio::spawn(telemetry::report_stats(
        Arc::clone(&broadcaster),
        poller_handle,
        config.stats_interval(),
        shutdown_rx.clone(),
    ));

    let ws = WsServer::new(Arc::clone(&broadcaster)).serve(ws_listener, shutdown_rx.clone());
    let grpc = async {
        match grpc_listener {
            Some(listener) => {
                GrpcServerBuilder::new()
                    .build(PricesServiceImpl::new(Arc::clone(&broadcaster)))
                    .serve(listener, shutdown_rx.clone())
                    .await
            }
            None => Ok(()),
        }
    };

    info!("Press Ctrl+C to shutdown");

    // The first server error drops the other server and stops the rest
    let served = tokio::try_join!(ws, grpc);
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_task.await {
        error!("Poller task failed: {}", e);
    }
    stats_task.abort();

    if let Err(e) = served {
        error!("Server error: {:#}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}
