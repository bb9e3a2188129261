//! Price source abstractions and implementations.
//!
//! This module contains:
//! - The `QuoteSource` trait that all sources implement
//! - Source configuration and the factory building sources from it
//! - Concrete sources (Binance, Coinbase, CoinGecko)
//!
//! Sources receive canonical symbols such as `BTCUSD`, `ETH-USDT` or
//! `SOL/EUR` and translate them into their own market identifiers. A
//! per-source `symbols` map overrides the built-in translation.

mod http;
mod traits;

pub mod binance;
pub mod coinbase;
pub mod coingecko;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::SourceTier;
use crate::registry::{RequestSpacing, SpacingMode};

pub use binance::BinanceSource;
pub use coinbase::CoinbaseSource;
pub use coingecko::CoinGeckoSource;
pub use traits::QuoteSource;

/// Request timeout used when neither the source nor the caller set one.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Quote currencies recognised when splitting a canonical symbol, longest first.
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "FDUSD", "USD", "EUR", "GBP", "BTC", "ETH"];

/// Which adapter a configured source uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Binance,
    Coinbase,
    Coingecko,
}

/// One configured source.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Defaults to the adapter's own id (`BINANCE`, `COINBASE`, `COINGECKO`).
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub min_spacing_ms: Option<u64>,
    #[serde(default)]
    pub spacing_mode: Option<SpacingMode>,
    /// Overrides the adapter's declared tier.
    #[serde(default)]
    pub tier: Option<SourceTier>,
    /// Canonical symbol -> provider market id.
    #[serde(default)]
    pub symbols: HashMap<String, String>,
}

impl SourceConfig {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            id: None,
            base_url: None,
            timeout_ms: None,
            min_spacing_ms: None,
            spacing_mode: None,
            tier: None,
            symbols: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Id the source will be registered under.
    pub fn source_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| match self.kind {
            SourceKind::Binance => binance::SOURCE_ID.to_string(),
            SourceKind::Coinbase => coinbase::SOURCE_ID.to_string(),
            SourceKind::Coingecko => coingecko::SOURCE_ID.to_string(),
        })
    }
}

/// Adapter defaults merged with a [`SourceConfig`].
pub(crate) struct SourceSettings {
    pub id: String,
    pub tier: SourceTier,
    pub spacing: RequestSpacing,
    pub base_url: String,
    pub timeout: Duration,
    pub symbols: HashMap<String, String>,
}

impl SourceSettings {
    pub(crate) fn resolve(
        config: &SourceConfig,
        tier: SourceTier,
        spacing: RequestSpacing,
        base_url: &str,
    ) -> Self {
        let spacing = RequestSpacing {
            min_interval: config
                .min_spacing_ms
                .map(Duration::from_millis)
                .unwrap_or(spacing.min_interval),
            mode: config.spacing_mode.unwrap_or(spacing.mode),
        };
        let symbols = config
            .symbols
            .iter()
            .map(|(canonical, market)| (normalize_symbol(canonical), market.clone()))
            .collect();

        Self {
            id: config.source_id(),
            tier: config.tier.unwrap_or(tier),
            spacing,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| base_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: config
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SOURCE_TIMEOUT),
            symbols,
        }
    }

    /// Configured market id for a canonical symbol, if any.
    pub(crate) fn override_for(&self, symbol: &str) -> Option<&str> {
        self.symbols.get(&normalize_symbol(symbol)).map(String::as_str)
    }
}

/// Uppercase and strip separators: `btc-usd` -> `BTCUSD`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !matches!(c, '-' | '/' | '_' | ':' | ' '))
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Split a canonical symbol into base and quote currency.
///
/// Separated forms (`ETH-USDT`, `SOL/EUR`) split at the separator; compact
/// forms (`BTCUSD`) split at a known quote currency suffix.
pub fn split_pair(symbol: &str) -> Option<(String, String)> {
    let trimmed = symbol.trim();
    if let Some((base, quote)) = trimmed.split_once(['-', '/', '_']) {
        let (base, quote) = (base.to_ascii_uppercase(), quote.to_ascii_uppercase());
        return (!base.is_empty() && !quote.is_empty()).then_some((base, quote));
    }

    let compact = normalize_symbol(trimmed);
    QUOTE_CURRENCIES.iter().find_map(|quote| {
        compact
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base.to_string(), quote.to_string()))
    })
}

/// Build sources from configuration, in configuration order.
///
/// Fails on duplicate source ids.
pub fn build_sources(configs: &[SourceConfig]) -> Result<Vec<Arc<dyn QuoteSource>>, MarketDataError> {
    let mut seen = HashSet::new();
    let mut sources: Vec<Arc<dyn QuoteSource>> = Vec::with_capacity(configs.len());

    for config in configs {
        let id = config.source_id();
        if !seen.insert(id.clone()) {
            return Err(MarketDataError::InvalidConfig {
                message: format!("Duplicate source id: {}", id),
            });
        }

        let source: Arc<dyn QuoteSource> = match config.kind {
            SourceKind::Binance => Arc::new(BinanceSource::from_config(config)),
            SourceKind::Coinbase => Arc::new(CoinbaseSource::from_config(config)),
            SourceKind::Coingecko => Arc::new(CoinGeckoSource::from_config(config)),
        };
        log::info!(
            "Registered source '{}' ({:?}, tier {})",
            source.id(),
            config.kind,
            source.tier()
        );
        sources.push(source);
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("btc-usd"), "BTCUSD");
        assert_eq!(normalize_symbol("SOL/EUR"), "SOLEUR");
        assert_eq!(normalize_symbol("ETHUSDT"), "ETHUSDT");
    }

    #[test]
    fn test_split_pair() {
        assert_eq!(
            split_pair("BTCUSD"),
            Some(("BTC".to_string(), "USD".to_string()))
        );
        assert_eq!(
            split_pair("ethusdt"),
            Some(("ETH".to_string(), "USDT".to_string()))
        );
        assert_eq!(
            split_pair("SOL/EUR"),
            Some(("SOL".to_string(), "EUR".to_string()))
        );
        assert_eq!(
            split_pair("DOGE-BTC"),
            Some(("DOGE".to_string(), "BTC".to_string()))
        );
        assert_eq!(split_pair("USD"), None);
        assert_eq!(split_pair("XYZ"), None);
        assert_eq!(split_pair("-USD"), None);
    }

    #[test]
    fn test_build_sources_defaults() {
        let configs = vec![
            SourceConfig::new(SourceKind::Binance),
            SourceConfig::new(SourceKind::Coinbase),
            SourceConfig::new(SourceKind::Coingecko),
        ];
        let sources = build_sources(&configs).unwrap();

        let ids: Vec<_> = sources.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["BINANCE", "COINBASE", "COINGECKO"]);
        assert_eq!(sources[0].tier(), SourceTier::Primary);
        assert_eq!(sources[1].tier(), SourceTier::Fallback);
        assert_eq!(sources[2].tier(), SourceTier::Emergency);
    }

    #[test]
    fn test_build_sources_rejects_duplicates() {
        let configs = vec![
            SourceConfig::new(SourceKind::Binance),
            SourceConfig::new(SourceKind::Coinbase).with_id("BINANCE"),
        ];
        assert!(matches!(
            build_sources(&configs),
            Err(MarketDataError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_settings_overrides() {
        let mut config = SourceConfig::new(SourceKind::Binance)
            .with_id("BINANCE_US")
            .with_base_url("https://api.binance.us/");
        config.min_spacing_ms = Some(250);
        config.spacing_mode = Some(SpacingMode::FailFast);
        config.tier = Some(SourceTier::Fallback);
        config.symbols.insert("btc-usd".to_string(), "BTCUSD".to_string());

        let settings = SourceSettings::resolve(
            &config,
            SourceTier::Primary,
            RequestSpacing::default(),
            "https://api.binance.com",
        );

        assert_eq!(settings.id, "BINANCE_US");
        assert_eq!(settings.tier, SourceTier::Fallback);
        assert_eq!(settings.base_url, "https://api.binance.us");
        assert_eq!(settings.spacing.min_interval, Duration::from_millis(250));
        assert_eq!(settings.spacing.mode, SpacingMode::FailFast);
        assert_eq!(settings.timeout, DEFAULT_SOURCE_TIMEOUT);
        assert_eq!(settings.override_for("BTCUSD"), Some("BTCUSD"));
    }

    #[test]
    fn test_source_config_from_json() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"kind": "coingecko", "timeoutMs": 4000, "symbols": {"PEPEUSD": "pepe"}}"#,
        )
        .unwrap();
        assert_eq!(config.kind, SourceKind::Coingecko);
        assert_eq!(config.source_id(), "COINGECKO");
        assert_eq!(config.timeout_ms, Some(4000));
        assert_eq!(config.symbols.get("PEPEUSD").map(String::as_str), Some("pepe"));
    }
}
