//! Streaming front ends for the price broadcaster
//!
//! WebSocket on `/ws` with JSON text frames, and the gRPC
//! `PricesStreamingService`. Both register a subscription, optionally replay
//! history, then forward live observations until the client goes away.

pub mod conversions;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod ws;

pub mod proto {
    tonic::include_proto!("prices");
}

use tokio::sync::watch;

/// Resolves once the flag is true or its sender is gone
pub(crate) async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub use server::{GrpcServer, GrpcServerBuilder, GrpcServerConfig};
pub use service::PricesServiceImpl;
pub use ws::{parse_stream_params, StreamParams, WsServer};
