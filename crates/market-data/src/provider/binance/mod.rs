//! Binance spot market source.
//!
//! Uses the public 24h ticker endpoint (`/api/v3/ticker/24hr`), which
//! returns last price, base volume and close time in one call without an
//! API key. USD pairs are quoted against USDT on Binance.
//!
//! API documentation: https://developers.binance.com/docs/binance-spot-api-docs/rest-api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::{parse_price, HttpFetcher};
use super::{split_pair, SourceConfig, SourceKind, SourceSettings};
use crate::errors::MarketDataError;
use crate::models::{Quote, SourceTier};
use crate::provider::QuoteSource;
use crate::registry::{RequestSpacing, SpacingMode};

const BASE_URL: &str = "https://api.binance.com";
pub(crate) const SOURCE_ID: &str = "BINANCE";

/// Binance error code for an unknown market.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Response from /api/v3/ticker/24hr
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    symbol: String,
    last_price: String,
    /// Base asset volume over 24h
    volume: Option<String>,
    /// Milliseconds since epoch
    close_time: Option<i64>,
}

/// Error body, e.g. `{"code":-1121,"msg":"Invalid symbol."}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i64,
    msg: String,
}

/// Binance spot price source.
pub struct BinanceSource {
    settings: SourceSettings,
    http: HttpFetcher,
}

impl BinanceSource {
    /// Create a source with the public endpoint and default settings.
    pub fn new() -> Self {
        Self::from_config(&SourceConfig::new(SourceKind::Binance))
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let settings = SourceSettings::resolve(
            config,
            SourceTier::Primary,
            RequestSpacing {
                min_interval: Duration::from_millis(100),
                mode: SpacingMode::Wait,
            },
            BASE_URL,
        );
        let http = HttpFetcher::new(&settings.id, settings.timeout);
        Self { settings, http }
    }

    /// Binance market id for a canonical symbol: `BTCUSD` -> `BTCUSDT`.
    fn market_symbol(&self, symbol: &str) -> Option<String> {
        if let Some(market) = self.settings.override_for(symbol) {
            return Some(market.to_string());
        }
        let (base, quote) = split_pair(symbol)?;
        let quote = if quote == "USD" { "USDT".to_string() } else { quote };
        Some(format!("{}{}", base, quote))
    }

    fn parse_ticker(&self, symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
        let ticker: TickerResponse = self.http.parse(body)?;
        let price = parse_price(&self.settings.id, "lastPrice", &ticker.last_price)?;

        let timestamp = ticker
            .close_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(symbol, price, timestamp, self.settings.id.as_str());
        match ticker.volume.as_deref().map(|v| parse_price(&self.settings.id, "volume", v)) {
            Some(Ok(volume)) => quote = quote.with_volume(volume),
            Some(Err(e)) => warn!("{}: ignoring volume for {}: {}", self.settings.id, ticker.symbol, e),
            None => {}
        }
        Ok(quote)
    }
}

impl Default for BinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for BinanceSource {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn tier(&self) -> SourceTier {
        self.settings.tier
    }

    fn spacing(&self) -> RequestSpacing {
        self.settings.spacing
    }

    async fn fetch_quote(&self, symbol: &str, timeout: Duration) -> Result<Quote, MarketDataError> {
        let market = self
            .market_symbol(symbol)
            .ok_or_else(|| MarketDataError::SymbolNotSupported {
                source_id: self.settings.id.clone(),
                symbol: symbol.to_string(),
            })?;

        let url = format!("{}/api/v3/ticker/24hr", self.settings.base_url);
        let (status, body) = self
            .http
            .get(&url, &[("symbol", market.as_str())], timeout)
            .await?;

        if status == StatusCode::BAD_REQUEST {
            if let Ok(error) = self.http.parse::<ErrorResponse>(&body) {
                if error.code == INVALID_SYMBOL_CODE {
                    debug!("{}: unknown market {} ({})", self.settings.id, market, error.msg);
                    return Err(MarketDataError::SymbolNotSupported {
                        source_id: self.settings.id.clone(),
                        symbol: symbol.to_string(),
                    });
                }
            }
        }
        if !status.is_success() {
            return Err(self.http.unexpected_status(status, &body));
        }

        self.parse_ticker(symbol, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER: &str = r#"{
        "symbol": "BTCUSDT",
        "priceChange": "-94.99999800",
        "lastPrice": "64250.10000000",
        "volume": "18231.51230000",
        "openTime": 1716465600000,
        "closeTime": 1716552000000,
        "count": 76
    }"#;

    #[test]
    fn test_source_metadata() {
        let source = BinanceSource::new();
        assert_eq!(source.id(), "BINANCE");
        assert_eq!(source.tier(), SourceTier::Primary);
        assert_eq!(source.spacing().min_interval, Duration::from_millis(100));
        assert_eq!(source.spacing().mode, SpacingMode::Wait);
    }

    #[test]
    fn test_market_symbol() {
        let source = BinanceSource::new();
        assert_eq!(source.market_symbol("BTCUSD").as_deref(), Some("BTCUSDT"));
        assert_eq!(source.market_symbol("eth-usdc").as_deref(), Some("ETHUSDC"));
        assert_eq!(source.market_symbol("SOL/EUR").as_deref(), Some("SOLEUR"));
        assert_eq!(source.market_symbol("NOPE"), None);
    }

    #[test]
    fn test_market_symbol_override() {
        let mut config = SourceConfig::new(SourceKind::Binance);
        config
            .symbols
            .insert("BTCUSD".to_string(), "BTCFDUSD".to_string());
        let source = BinanceSource::from_config(&config);
        assert_eq!(source.market_symbol("BTC-USD").as_deref(), Some("BTCFDUSD"));
    }

    #[test]
    fn test_parse_ticker() {
        let source = BinanceSource::new();
        let quote = source.parse_ticker("BTCUSD", TICKER).unwrap();

        assert_eq!(quote.symbol(), "BTCUSD");
        assert_eq!(quote.price(), 64_250.1);
        assert_eq!(quote.volume(), Some(18_231.5123));
        assert_eq!(quote.source(), "BINANCE");
        assert_eq!(quote.timestamp().timestamp_millis(), 1716552000000);
    }

    #[test]
    fn test_parse_ticker_bad_price() {
        let source = BinanceSource::new();
        let body = r#"{"symbol": "BTCUSDT", "lastPrice": "n/a"}"#;
        assert!(matches!(
            source.parse_ticker("BTCUSD", body),
            Err(MarketDataError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmapped_symbol_fails_without_request() {
        let source = BinanceSource::from_config(
            &SourceConfig::new(SourceKind::Binance).with_base_url("http://127.0.0.1:9"),
        );
        let result = source.fetch_quote("???", Duration::from_millis(100)).await;
        assert!(matches!(
            result,
            Err(MarketDataError::SymbolNotSupported { ref symbol, .. }) if symbol == "???"
        ));
    }
}
