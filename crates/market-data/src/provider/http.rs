//! Shared HTTP plumbing for the concrete sources.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::MarketDataError;

/// Thin wrapper around a `reqwest::Client` that maps failures onto
/// [`MarketDataError`] for one source.
pub(crate) struct HttpFetcher {
    client: Client,
    source_id: String,
}

impl HttpFetcher {
    pub(crate) fn new(source_id: &str, timeout: Duration) -> Self {
        let client = client_or_default(source_id, Client::builder().timeout(timeout).build());

        Self {
            client,
            source_id: source_id.to_string(),
        }
    }

    /// GET `url` and return status plus body.
    ///
    /// Timeouts become `RequestTimeout` and HTTP 429 becomes
    /// `RequestTooSoon`. Other statuses are left to the caller.
    pub(crate) async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<(StatusCode, String), MarketDataError> {
        debug!("{} request: {} with {} params", self.source_id, url, query.len());

        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RequestTooSoon {
                source_id: self.source_id.clone(),
            });
        }

        let body = response.text().await.map_err(|e| self.send_error(e))?;
        Ok((status, body))
    }

    fn send_error(&self, e: reqwest::Error) -> MarketDataError {
        if e.is_timeout() {
            MarketDataError::RequestTimeout {
                source_id: self.source_id.clone(),
            }
        } else {
            MarketDataError::transport(&self.source_id, format!("Request failed: {}", e))
        }
    }

    /// Error for a non-success status the caller did not handle itself.
    pub(crate) fn unexpected_status(&self, status: StatusCode, body: &str) -> MarketDataError {
        MarketDataError::transport(&self.source_id, format!("HTTP {} - {}", status, body))
    }

    pub(crate) fn parse<T: DeserializeOwned>(&self, body: &str) -> Result<T, MarketDataError> {
        parse_json(&self.source_id, body)
    }
}

/// The built client, or a default one when the builder failed.
///
/// The default client has no client-wide timeout; every request still
/// carries its own.
fn client_or_default(source_id: &str, built: reqwest::Result<Client>) -> Client {
    built.unwrap_or_else(|e| {
        warn!(
            "{}: failed to build HTTP client ({}), falling back to defaults",
            source_id, e
        );
        Client::new()
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(source_id: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| {
        MarketDataError::transport(source_id, format!("Failed to parse response: {}", e))
    })
}

/// Parse a decimal string as sent by most exchanges (`"64250.10"`).
///
/// Non-finite values such as `"NaN"` are passed through; the validator
/// rejects them.
pub(crate) fn parse_price(source_id: &str, field: &str, raw: &str) -> Result<f64, MarketDataError> {
    raw.trim().parse::<f64>().map_err(|_| {
        MarketDataError::transport(source_id, format!("Invalid {} value: {:?}", field, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("X", "price", "64250.10").unwrap(), 64_250.10);
        assert_eq!(parse_price("X", "price", " 1.5 ").unwrap(), 1.5);
        assert!(parse_price("X", "price", "NaN").unwrap().is_nan());
        assert!(matches!(
            parse_price("X", "price", "abc"),
            Err(MarketDataError::Transport { .. })
        ));
    }

    #[test]
    fn test_client_build_failure_falls_back() {
        // No TLS version satisfies both bounds
        let built = Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_3)
            .max_tls_version(reqwest::tls::Version::TLS_1_2)
            .build();
        assert!(built.is_err());

        let fetcher = HttpFetcher {
            client: client_or_default("BINANCE", built),
            source_id: "BINANCE".to_string(),
        };
        assert_eq!(fetcher.source_id, "BINANCE");
    }

    #[test]
    fn test_parse_json_error_is_transport() {
        let result: Result<serde_json::Value, _> = parse_json("BINANCE", "{not json");
        assert!(matches!(
            result,
            Err(MarketDataError::Transport { ref source_id, .. }) if source_id == "BINANCE"
        ));
    }

    #[test]
    fn test_unexpected_status() {
        let fetcher = HttpFetcher::new("COINBASE", Duration::from_secs(1));
        let err = fetcher.unexpected_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("upstream down"));
    }
}
