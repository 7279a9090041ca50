//! Price source implementations

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use pricecast_core::{Currency, CurrencyRate, PriceObservation, SourceError, SourceResult};

/// Something that can produce the current price on demand
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self) -> SourceResult<PriceObservation>;
    fn name(&self) -> &str;
}

/// CoinDesk current price payload
#[derive(Debug, Deserialize)]
struct CoinDeskResponse {
    time: CoinDeskTime,
    #[serde(default)]
    disclaimer: String,
    #[serde(rename = "chartName", default)]
    chart_name: String,
    bpi: BTreeMap<String, CurrencyRate>,
}

#[derive(Debug, Deserialize)]
struct CoinDeskTime {
    #[serde(default)]
    updated: String,
    #[serde(rename = "updatedISO")]
    updated_iso: DateTime<FixedOffset>,
    #[serde(default)]
    updateduk: String,
}

/// Decode a CoinDesk body. Currencies other than USD/GBP/EUR are ignored.
pub fn parse_coindesk(body: &str) -> SourceResult<PriceObservation> {
    let payload: CoinDeskResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;

    let rates = payload
        .bpi
        .into_iter()
        .filter_map(|(code, rate)| match code.parse::<Currency>() {
            Ok(currency) => Some((currency, rate)),
            Err(_) => {
                debug!(code = %code, "Ignoring unsupported currency");
                None
            }
        })
        .collect();

    Ok(PriceObservation {
        observed_at: payload.time.updated_iso.with_timezone(&Utc),
        updated: payload.time.updated,
        updated_uk: payload.time.updateduk,
        disclaimer: payload.disclaimer,
        chart_name: payload.chart_name,
        rates,
    })
}

/// HTTP JSON source for the CoinDesk BPI endpoint
pub struct CoinDeskSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl CoinDeskSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SourceError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl PriceSource for CoinDeskSource {
    async fn get_price(&self) -> SourceResult<PriceObservation> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %self.url, status = status.as_u16(), "Price source returned non-200");
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        parse_coindesk(&body)
    }

    fn name(&self) -> &str {
        "coindesk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    const SAMPLE: &str = r#"{
        "time": {
            "updated": "Jan 23, 2024 13:15:00 UTC",
            "updatedISO": "2024-01-23T13:15:00+00:00",
            "updateduk": "Jan 23, 2024 at 13:15 GMT"
        },
        "disclaimer": "This data was produced from the CoinDesk Bitcoin Price Index (USD).",
        "chartName": "Bitcoin",
        "bpi": {
            "USD": {"code": "USD", "symbol": "&#36;", "rate": "39,912.7350", "description": "United States Dollar", "rate_float": 39912.735},
            "GBP": {"code": "GBP", "symbol": "&pound;", "rate": "31,429.5463", "description": "British Pound Sterling", "rate_float": 31429.5463},
            "EUR": {"code": "EUR", "symbol": "&euro;", "rate": "36,728.2167", "description": "Euro", "rate_float": 36728.2167},
            "JPY": {"code": "JPY", "symbol": "&yen;", "rate": "1", "description": "Yen", "rate_float": 1.0}
        }
    }"#;

    /// Serve one canned HTTP response on a loopback port
    async fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/v1/bpi/currentprice.json")
    }

    #[test]
    fn test_parse_sample() {
        let obs = assert_ok!(parse_coindesk(SAMPLE));

        assert_eq!(obs.timestamp(), 1_706_015_700);
        assert_eq!(obs.chart_name, "Bitcoin");
        assert_eq!(obs.updated, "Jan 23, 2024 13:15:00 UTC");
        assert_eq!(obs.rates.len(), 3);
        assert_eq!(obs.usd_price(), 39912.735);
        assert_eq!(obs.rate(Currency::Gbp).unwrap().rate, "31,429.5463");
    }

    #[test]
    fn test_parse_garbage() {
        let err = assert_err!(parse_coindesk("<html>maintenance</html>"));
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let url = serve_once("200 OK", SAMPLE, Duration::ZERO).await;
        let source = CoinDeskSource::new(url, Duration::from_secs(2)).unwrap();

        let obs = assert_ok!(source.get_price().await);
        assert_eq!(obs.rate_float(Currency::Eur), Some(36728.2167));
    }

    #[tokio::test]
    async fn test_non_200_is_an_error() {
        let url = serve_once("503 Service Unavailable", "{}", Duration::ZERO).await;
        let source = CoinDeskSource::new(url, Duration::from_secs(2)).unwrap();

        let err = assert_err!(source.get_price().await);
        assert!(matches!(err, SourceError::Status(503)));
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let url = serve_once("200 OK", SAMPLE, Duration::from_secs(2)).await;
        let source = CoinDeskSource::new(url, Duration::from_millis(100)).unwrap();

        let err = assert_err!(source.get_price().await);
        assert!(matches!(err, SourceError::Timeout(100)));
    }
}
