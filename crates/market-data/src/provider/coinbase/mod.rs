//! Coinbase spot price source.
//!
//! Uses the public `/v2/prices/{pair}/spot` endpoint. The response carries
//! only the amount, so quotes are stamped with the local receive time and
//! have no volume.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::http::{parse_price, HttpFetcher};
use super::{split_pair, SourceConfig, SourceKind, SourceSettings};
use crate::errors::MarketDataError;
use crate::models::{Quote, SourceTier};
use crate::provider::QuoteSource;
use crate::registry::{RequestSpacing, SpacingMode};

const BASE_URL: &str = "https://api.coinbase.com";
pub(crate) const SOURCE_ID: &str = "COINBASE";

/// `{"data": {"amount": "64250.12", "base": "BTC", "currency": "USD"}}`
#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Debug, Deserialize)]
struct SpotPrice {
    amount: String,
}

/// Coinbase spot price source.
pub struct CoinbaseSource {
    settings: SourceSettings,
    http: HttpFetcher,
}

impl CoinbaseSource {
    pub fn new() -> Self {
        Self::from_config(&SourceConfig::new(SourceKind::Coinbase))
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let settings = SourceSettings::resolve(
            config,
            SourceTier::Fallback,
            RequestSpacing {
                min_interval: Duration::from_millis(200),
                mode: SpacingMode::Wait,
            },
            BASE_URL,
        );
        let http = HttpFetcher::new(&settings.id, settings.timeout);
        Self { settings, http }
    }

    /// Coinbase pair for a canonical symbol: `BTCUSDT` -> `BTC-USD`.
    ///
    /// Coinbase spot prices are fiat-quoted; stablecoin quotes collapse to USD.
    fn pair(&self, symbol: &str) -> Option<String> {
        if let Some(pair) = self.settings.override_for(symbol) {
            return Some(pair.to_string());
        }
        let (base, quote) = split_pair(symbol)?;
        let quote = match quote.as_str() {
            "USDT" | "USDC" | "FDUSD" => "USD".to_string(),
            _ => quote,
        };
        Some(format!("{}-{}", base, quote))
    }

    fn parse_spot(&self, symbol: &str, body: &str) -> Result<Quote, MarketDataError> {
        let response: SpotResponse = self.http.parse(body)?;
        let price = parse_price(&self.settings.id, "amount", &response.data.amount)?;
        Ok(Quote::new(symbol, price, Utc::now(), self.settings.id.as_str()))
    }
}

impl Default for CoinbaseSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for CoinbaseSource {
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
        let pair = self
            .pair(symbol)
            .ok_or_else(|| MarketDataError::SymbolNotSupported {
                source_id: self.settings.id.clone(),
                symbol: symbol.to_string(),
            })?;

        let url = format!("{}/v2/prices/{}/spot", self.settings.base_url, pair);
        let (status, body) = self.http.get(&url, &[], timeout).await?;

        if status == StatusCode::NOT_FOUND {
            debug!("{}: unknown pair {}", self.settings.id, pair);
            return Err(MarketDataError::SymbolNotSupported {
                source_id: self.settings.id.clone(),
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(self.http.unexpected_status(status, &body));
        }

        self.parse_spot(symbol, &body)
    }
}
