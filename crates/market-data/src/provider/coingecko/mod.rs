//! CoinGecko aggregated price source.
//!
//! Uses `/api/v3/simple/price`. CoinGecko aggregates many venues and has a
//! tight free-tier limit, so it is declared as an emergency source: slow
//! spacing, only consulted after every primary and fallback source.
//!
//! CoinGecko identifies coins by slug (`bitcoin`, `ethereum`), not ticker.
//! Tickers outside the built-in table need a `symbols` override.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing::debug;

use super::http::HttpFetcher;
use super::{split_pair, SourceConfig, SourceKind, SourceSettings};
use crate::errors::MarketDataError;
use crate::models::{Quote, SourceTier};
use crate::provider::QuoteSource;
use crate::registry::{RequestSpacing, SpacingMode};

const BASE_URL: &str = "https://api.coingecko.com";
pub(crate) const SOURCE_ID: &str = "COINGECKO";

/// Ticker -> CoinGecko coin id.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("MATIC", "matic-network"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
];

/// `{"bitcoin": {"usd": 64250.0, "usd_24h_vol": 3.1e10, "last_updated_at": 1716552000}}`
type CoinPrice = HashMap<String, Option<f64>>;

/// CoinGecko simple price source.
pub struct CoinGeckoSource {
    settings: SourceSettings,
    http: HttpFetcher,
}

impl CoinGeckoSource {
    pub fn new() -> Self {
        Self::from_config(&SourceConfig::new(SourceKind::Coingecko))
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let settings = SourceSettings::resolve(
            config,
            SourceTier::Emergency,
            RequestSpacing {
                min_interval: Duration::from_secs(2),
                mode: SpacingMode::Wait,
            },
            BASE_URL,
        );
        let http = HttpFetcher::new(&settings.id, settings.timeout);
        Self { settings, http }
    }

    /// Coin id and lowercase vs-currency for a canonical symbol.
    ///
    /// Overrides name the coin id only; the vs-currency still comes from the
    /// symbol. Stablecoin quotes are priced in `usd`.
    fn coin_and_currency(&self, symbol: &str) -> Option<(String, String)> {
        let (base, quote) = split_pair(symbol)?;
        let vs_currency = match quote.as_str() {
            "USDT" | "USDC" | "FDUSD" => "usd".to_string(),
            other => other.to_ascii_lowercase(),
        };

        let coin = match self.settings.override_for(symbol) {
            Some(coin) => coin.to_string(),
            None => COIN_IDS
                .iter()
                .find(|(ticker, _)| *ticker == base)
                .map(|(_, id)| id.to_string())?,
        };
        Some((coin, vs_currency))
    }

    fn parse_simple_price(
        &self,
        symbol: &str,
        coin: &str,
        vs_currency: &str,
        body: &str,
    ) -> Result<Quote, MarketDataError> {
        let mut response: HashMap<String, CoinPrice> = self.http.parse(body)?;

        // Unknown ids come back as an empty object, not an error status
        let Some(entry) = response.remove(coin) else {
            return Err(MarketDataError::SymbolNotSupported {
                source_id: self.settings.id.clone(),
                symbol: symbol.to_string(),
            });
        };

        let price = entry
            .get(vs_currency)
            .copied()
            .flatten()
            .ok_or_else(|| {
                MarketDataError::transport(
                    &self.settings.id,
                    format!("No {} price for {}", vs_currency, coin),
                )
            })?;

        let timestamp = entry
            .get("last_updated_at")
            .copied()
            .flatten()
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or_else(Utc::now);

        let mut quote = Quote::new(symbol, price, timestamp, self.settings.id.as_str());
        if let Some(volume) = entry
            .get(&format!("{}_24h_vol", vs_currency))
            .copied()
            .flatten()
        {
            quote = quote.with_volume(volume);
        }
        Ok(quote)
    }
}

impl Default for CoinGeckoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoSource {
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
        let (coin, vs_currency) =
            self.coin_and_currency(symbol)
                .ok_or_else(|| MarketDataError::SymbolNotSupported {
                    source_id: self.settings.id.clone(),
                    symbol: symbol.to_string(),
                })?;

        let url = format!("{}/api/v3/simple/price", self.settings.base_url);
        let query = [
            ("ids", coin.as_str()),
            ("vs_currencies", vs_currency.as_str()),
            ("include_24hr_vol", "true"),
            ("include_last_updated_at", "true"),
        ];
        let (status, body) = self.http.get(&url, &query, timeout).await?;
        if !status.is_success() {
            return Err(self.http.unexpected_status(status, &body));
        }

        debug!("{}: received price for {} in {}", self.settings.id, coin, vs_currency);
        self.parse_simple_price(symbol, &coin, &vs_currency, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_metadata() {
        let source = CoinGeckoSource::new();
        assert_eq!(source.id(), "COINGECKO");
        assert_eq!(source.tier(), SourceTier::Emergency);
        assert_eq!(source.spacing().min_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_coin_and_currency() {
        let source = CoinGeckoSource::new();
        assert_eq!(
            source.coin_and_currency("BTCUSD"),
            Some(("bitcoin".to_string(), "usd".to_string()))
        );
        assert_eq!(
            source.coin_and_currency("ETH-USDT"),
            Some(("ethereum".to_string(), "usd".to_string()))
        );
        assert_eq!(
            source.coin_and_currency("SOLEUR"),
            Some(("solana".to_string(), "eur".to_string()))
        );
        assert_eq!(source.coin_and_currency("PEPEUSD"), None);
    }

    #[test]
    fn test_coin_override() {
        let mut config = SourceConfig::new(SourceKind::Coingecko);
        config.symbols.insert("PEPEUSD".to_string(), "pepe".to_string());
        let source = CoinGeckoSource::from_config(&config);

        assert_eq!(
            source.coin_and_currency("PEPE-USD"),
            Some(("pepe".to_string(), "usd".to_string()))
        );
    }

    #[test]
    fn test_parse_simple_price() {
        let source = CoinGeckoSource::new();
        let body = r#"{"bitcoin": {"usd": 64250.5, "usd_24h_vol": 31000000000.0, "last_updated_at": 1716552000}}"#;
        let quote = source
            .parse_simple_price("BTCUSD", "bitcoin", "usd", body)
            .unwrap();

        assert_eq!(quote.symbol(), "BTCUSD");
        assert_eq!(quote.price(), 64_250.5);
        assert_eq!(quote.volume(), Some(31_000_000_000.0));
        assert_eq!(quote.timestamp().timestamp(), 1716552000);
        assert_eq!(quote.source(), "COINGECKO");
    }

    #[test]
    fn test_parse_unknown_coin() {
        let source = CoinGeckoSource::new();
        let result = source.parse_simple_price("BTCUSD", "bitcoin", "usd", "{}");
        assert!(matches!(
            result,
            Err(MarketDataError::SymbolNotSupported { .. })
        ));
    }

    #[test]
    fn test_parse_missing_currency() {
        let source = CoinGeckoSource::new();
        let body = r#"{"bitcoin": {"eur": 59000.0}}"#;
        assert!(matches!(
            source.parse_simple_price("BTCUSD", "bitcoin", "usd", body),
            Err(MarketDataError::Transport { .. })
        ));
    }
}
