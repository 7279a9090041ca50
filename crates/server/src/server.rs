//! gRPC server configuration and startup

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

use crate::proto::prices_streaming_service_server::PricesStreamingServiceServer;
use crate::service::PricesServiceImpl;
use crate::stop_requested;

/// Server configuration
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    pub concurrency_limit_per_connection: usize,
    pub keep_alive_interval: Duration,
    pub keep_alive_timeout: Duration,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit_per_connection: 256,
            keep_alive_interval: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(20),
        }
    }
}

/// gRPC server wrapper
pub struct GrpcServer {
    config: GrpcServerConfig,
    service: PricesServiceImpl,
}

impl GrpcServer {
    pub fn new(config: GrpcServerConfig, service: PricesServiceImpl) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &GrpcServerConfig {
        &self.config
    }

    /// Serve on an already bound listener until `shutdown` flips to true
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("gRPC server listening on {}", listener.local_addr()?);

        Server::builder()
            .concurrency_limit_per_connection(self.config.concurrency_limit_per_connection)
            .http2_keepalive_interval(Some(self.config.keep_alive_interval))
            .http2_keepalive_timeout(Some(self.config.keep_alive_timeout))
            .add_service(PricesStreamingServiceServer::new(self.service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stop_requested(&mut shutdown).await;
                info!("gRPC server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Builder for server configuration
pub struct GrpcServerBuilder {
    config: GrpcServerConfig,
}

impl GrpcServerBuilder {
    pub fn new() -> Self {
        Self {
            config: GrpcServerConfig::default(),
        }
    }

    pub fn concurrency_limit_per_connection(mut self, limit: usize) -> Self {
        self.config.concurrency_limit_per_connection = limit;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    pub fn keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.config.keep_alive_timeout = timeout;
        self
    }

    pub fn build(self, service: PricesServiceImpl) -> GrpcServer {
        GrpcServer::new(self.config, service)
    }
}

impl Default for GrpcServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_broadcast::Broadcaster;
    use pricecast_store::MemoryStore;
    use std::sync::Arc;

    fn service() -> PricesServiceImpl {
        PricesServiceImpl::new(Arc::new(Broadcaster::new(Arc::new(MemoryStore::new()))))
    }

    #[test]
    fn test_default_config() {
        let config = GrpcServerConfig::default();
        assert_eq!(config.concurrency_limit_per_connection, 256);
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_builder() {
        let server = GrpcServerBuilder::new()
            .keep_alive_interval(Duration::from_secs(30))
            .concurrency_limit_per_connection(8)
            .build(service());

        assert_eq!(server.config().keep_alive_interval, Duration::from_secs(30));
        assert_eq!(server.config().concurrency_limit_per_connection, 8);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(GrpcServerBuilder::new().build(service()).serve(listener, shutdown_rx));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
