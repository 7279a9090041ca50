//! WebSocket endpoint
//!
//! `GET /ws[?since_date=<epoch secs>][&currency=USD&currency=EUR...]`
//! upgrades to a socket that receives one JSON text frame per observation.
//! A `since_date` that is not an integer closes the socket before any
//! subscription exists.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use pricecast_broadcast::{Broadcaster, Subscription};
use pricecast_core::CurrencyFilter;

use crate::stop_requested;

pub const WS_PATH: &str = "/ws";

/// Query parameters of a stream request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamParams {
    /// Replay history strictly newer than this epoch second
    pub since: Option<i64>,
    pub currencies: CurrencyFilter,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("since_date must be an integer, got '{0}'")]
    InvalidSince(String),
}

/// Parse `since_date` and repeated `currency` parameters from a raw query
///
/// Unknown currency codes and unrelated parameters are ignored. When
/// `since_date` repeats, the first occurrence wins.
pub fn parse_stream_params(query: Option<&str>) -> Result<StreamParams, ParamError> {
    let mut since_raw: Option<String> = None;
    let mut codes = Vec::new();

    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = decode(value);
        match decode(key).as_str() {
            "since_date" if since_raw.is_none() => since_raw = Some(value),
            "currency" => codes.push(value),
            _ => {}
        }
    }

    let since = since_raw
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| ParamError::InvalidSince(raw.clone()))
        })
        .transpose()?;

    Ok(StreamParams {
        since,
        currencies: CurrencyFilter::from_codes(codes),
    })
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Why a delivery loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    ClientClosed,
    WriteFailed,
    Deregistered,
}

/// WebSocket accept loop
pub struct WsServer {
    broadcaster: Arc<Broadcaster>,
}

impl WsServer {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Accept connections on `listener` until `shutdown` flips to true
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("WebSocket server listening on {}{}", listener.local_addr()?, WS_PATH);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let broadcaster = Arc::clone(&self.broadcaster);
                        tokio::spawn(handle_connection(stream, peer, broadcaster));
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        info!("WebSocket server shutting down");
        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broadcaster: Arc<Broadcaster>) {
    let mut query: Option<String> = None;

    let callback = |req: &Request, response: Response| {
        if req.uri().path() != WS_PATH {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }
        query = req.uri().query().map(str::to_owned);
        Ok(response)
    };

    let mut socket = match accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(%peer, "WebSocket handshake rejected: {}", e);
            return;
        }
    };

    let params = match parse_stream_params(query.as_deref()) {
        Ok(params) => params,
        Err(e) => {
            warn!(%peer, "Rejecting stream request: {}", e);
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: e.to_string().into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let mut subscription = broadcaster.register_filtered(params.currencies);
    let id = subscription.id();
    info!(subscription = %id, %peer, since_date = ?params.since, "WebSocket stream opened");

    if let Some(since) = params.since {
        broadcaster.replay_backlog(&mut subscription, since).await;
    }

    let end = stream_to_socket(socket, &mut subscription).await;

    broadcaster.deregister(id);
    info!(subscription = %id, %peer, reason = ?end, "WebSocket stream closed");
}

/// Forward a subscription into the socket until either side ends
async fn stream_to_socket(
    socket: WebSocketStream<TcpStream>,
    subscription: &mut Subscription,
) -> SessionEnd {
    let (mut sink, mut source) = socket.split();

    // Inbound frames are drained only to notice the client leaving
    let id = subscription.id();
    let (gone_tx, mut gone_rx) = oneshot::channel::<()>();
    let reader = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(msg) => debug!(subscription = %id, len = msg.len(), "Inbound frame ignored"),
                Err(e) => {
                    debug!(subscription = %id, "Read failed: {}", e);
                    break;
                }
            }
        }
        let _ = gone_tx.send(());
    });

    let end = loop {
        let observation = tokio::select! {
            _ = &mut gone_rx => break SessionEnd::ClientClosed,
            next = subscription.recv() => match next {
                Some(observation) => observation,
                None => break SessionEnd::Deregistered,
            },
        };

        let text = match subscription.project(&observation).to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(subscription = %id, "Failed to encode message: {}", e);
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(subscription = %id, "Write failed: {}", e);
            break SessionEnd::WriteFailed;
        }
    };

    reader.abort();
    let _ = sink.close().await;
    end
}
