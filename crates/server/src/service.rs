//! gRPC service implementation

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use pricecast_broadcast::{Broadcaster, Subscription};
use pricecast_core::CurrencyFilter;

use crate::proto::prices_streaming_service_server::PricesStreamingService;
use crate::proto::{PricesRequest, PricesResponse};

/// Responses buffered between the delivery task and tonic
const OUTBOUND_BUFFER: usize = 16;

/// `PricesStreamingService` backed by the shared broadcaster
#[derive(Clone)]
pub struct PricesServiceImpl {
    broadcaster: Arc<Broadcaster>,
}

impl PricesServiceImpl {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[tonic::async_trait]
impl PricesStreamingService for PricesServiceImpl {
    type GetDataStreamingStream =
        Pin<Box<dyn Stream<Item = Result<PricesResponse, Status>> + Send + 'static>>;

    async fn get_data_streaming(
        &self,
        request: Request<PricesRequest>,
    ) -> Result<Response<Self::GetDataStreamingStream>, Status> {
        let peer = request.remote_addr();
        let req = request.into_inner();

        let filter = CurrencyFilter::from_codes(&req.currency);
        let mut subscription = self.broadcaster.register_filtered(filter);
        info!(
            subscription = %subscription.id(),
            peer = ?peer,
            since_date = req.since_date,
            "gRPC stream opened"
        );

        if req.since_date != 0 {
            self.broadcaster
                .replay_backlog(&mut subscription, req.since_date)
                .await;
        }

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        tokio::spawn(deliver(subscription, tx));

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Forward one subscription to one gRPC stream until either side ends
async fn deliver(
    mut subscription: Subscription,
    tx: mpsc::Sender<Result<PricesResponse, Status>>,
) {
    let mut sent = 0u64;

    loop {
        let observation = tokio::select! {
            _ = tx.closed() => break,
            next = subscription.recv() => match next {
                Some(observation) => observation,
                None => break,
            },
        };

        let response = PricesResponse::from(&subscription.project(&observation));
        if tx.send(Ok(response)).await.is_err() {
            break;
        }
        sent += 1;
    }

    debug!(subscription = %subscription.id(), sent, "gRPC stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pricecast_core::{Currency, PriceObservation};
    use pricecast_store::{HistoricalStore, MemoryStore};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn observation(secs: i64) -> PriceObservation {
        PriceObservation::new(
            Utc.timestamp_opt(secs, 0).unwrap(),
            "disclaimer",
            "Bitcoin",
            [
                (Currency::Usd, secs as f64),
                (Currency::Eur, secs as f64 / 2.0),
                (Currency::Gbp, secs as f64 / 4.0),
            ],
        )
    }

    async fn wait_for_subscribers(broadcaster: &Broadcaster, expected: usize) {
        for _ in 0..100 {
            if broadcaster.subscriber_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} subscribers, found {}",
            broadcaster.subscriber_count()
        );
    }

    #[tokio::test]
    async fn test_live_stream_without_backlog() {
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(MemoryStore::new())));
        let service = PricesServiceImpl::new(Arc::clone(&broadcaster));

        let mut stream = service
            .get_data_streaming(Request::new(PricesRequest {
                currency: vec![],
                since_date: 0,
            }))
            .await
            .unwrap()
            .into_inner();

        broadcaster.publish(observation(1));

        let response = stream.next().await.unwrap().unwrap();
        assert_eq!(response.time_date, 1);
        assert_eq!(response.price, "1.000000");
        assert_eq!(response.price_usd, None);
        assert_eq!(response.price_eur, None);
        assert_eq!(response.price_gbp, None);
    }

    #[tokio::test]
    async fn test_backlog_then_live_with_filter() {
        let store = Arc::new(MemoryStore::new());
        store.create(&observation(10)).await.unwrap();
        store.create(&observation(20)).await.unwrap();
        let broadcaster = Arc::new(Broadcaster::new(store));
        let service = PricesServiceImpl::new(Arc::clone(&broadcaster));

        let mut stream = service
            .get_data_streaming(Request::new(PricesRequest {
                currency: vec!["eur".into(), "XYZ".into()],
                since_date: 15,
            }))
            .await
            .unwrap()
            .into_inner();

        broadcaster.publish(observation(30));

        let replayed = stream.next().await.unwrap().unwrap();
        assert_eq!(replayed.time_date, 20);
        assert_eq!(replayed.price_eur.as_deref(), Some("10.000000"));
        assert_eq!(replayed.price_gbp, None);

        let live = stream.next().await.unwrap().unwrap();
        assert_eq!(live.time_date, 30);
        assert_eq!(live.price, "30.000000");
        assert_eq!(live.price_eur.as_deref(), Some("15.000000"));
    }

    #[tokio::test]
    async fn test_client_disconnect_deregisters() {
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(MemoryStore::new())));
        let service = PricesServiceImpl::new(Arc::clone(&broadcaster));

        let stream = service
            .get_data_streaming(Request::new(PricesRequest::default()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(stream);
        wait_for_subscribers(&broadcaster, 0).await;
    }
}
