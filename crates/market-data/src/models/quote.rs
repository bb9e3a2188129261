use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSeconds};

use super::priority::SourceTier;

/// Point-in-time price observation for a symbol from one source.
///
/// Fields are private: a quote is immutable once a source has produced it.
/// Prices stay `f64` so that non-finite provider values reach the validator.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    symbol: String,
    price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f64>,
    timestamp: DateTime<Utc>,
    source: String,
}

impl Quote {
    /// Create a new quote with minimal required fields
    pub fn new(
        symbol: impl Into<String>,
        price: f64,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume: None,
            timestamp,
            source: source.into(),
        }
    }

    /// Attach the traded volume reported alongside the price.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn volume(&self) -> Option<f64> {
        self.volume
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Source that produced the quote (BINANCE, COINBASE, ...)
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Where an acquired quote came from.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QuoteOrigin {
    /// Fetched during this call.
    Live { tier: SourceTier },
    /// Cache hit within the caller's max age.
    Cached {
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        #[serde(rename = "ageMs")]
        age: Duration,
    },
    /// Fallback entry older than the caller's max age.
    Stale {
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        #[serde(rename = "ageMs")]
        age: Duration,
    },
}

/// A quote together with its origin tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquiredQuote {
    pub quote: Quote,
    pub origin: QuoteOrigin,
}

impl AcquiredQuote {
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, QuoteOrigin::Stale { .. })
    }

    pub fn is_live(&self) -> bool {
        matches!(self.origin, QuoteOrigin::Live { .. })
    }
}
