//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all acquisition operations
//! - [`RetryClass`]: Classification for determining failover behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::PriorityClass;

/// Errors that can occur while acquiring market data.
///
/// Per-source variants are recovered inside the coordinator by moving on to
/// the next source. Only [`MarketDataError::NoDataAvailable`] is terminal for
/// a `get_quote` call.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The validator rejected a price returned by a source.
    #[error("Validation failed for {symbol} at {price}: {reason}")]
    ValidationFailed {
        symbol: String,
        price: f64,
        reason: String,
    },

    /// The circuit breaker is open for this source.
    #[error("Source unavailable: {source_id}")]
    SourceUnavailable { source_id: String },

    /// The source did not answer within its slice of the deadline.
    #[error("Request timeout: {source_id}")]
    RequestTimeout { source_id: String },

    /// The request arrived before the source's minimum spacing elapsed,
    /// or the provider itself answered with HTTP 429.
    #[error("Request too soon: {source_id}")]
    RequestTooSoon { source_id: String },

    /// Any other transport or decoding failure talking to a source.
    #[error("Transport error: {source_id} - {message}")]
    Transport { source_id: String, message: String },

    /// The source has no mapping for the requested symbol.
    #[error("Symbol {symbol} not supported by {source_id}")]
    SymbolNotSupported { source_id: String, symbol: String },

    /// The priority class has exhausted its request budget for the window.
    #[error("Rate limited: {priority}")]
    RateLimited { priority: PriorityClass },

    /// No fresh source, no emergency source and no usable stale entry.
    #[error("No data available for {symbol}")]
    NoDataAvailable { symbol: String },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Low-level HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: terminal, surfaced to the caller
    /// - [`RetryClass::FailoverWithPenalty`]: next source, breaker failure recorded
    /// - [`RetryClass::NextProvider`]: next source, no penalty
    /// - [`RetryClass::CircuitOpen`]: source skipped
    ///
    /// # Examples
    ///
    /// ```
    /// use tradebot_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RequestTimeout { source_id: "BINANCE".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = MarketDataError::NoDataAvailable { symbol: "BTCUSD".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport { .. }
            | Self::RequestTimeout { .. }
            | Self::RequestTooSoon { .. }
            | Self::ValidationFailed { .. }
            | Self::Network(_) => RetryClass::FailoverWithPenalty,

            Self::SymbolNotSupported { .. } => RetryClass::NextProvider,

            Self::SourceUnavailable { .. } => RetryClass::CircuitOpen,

            Self::RateLimited { .. } | Self::NoDataAvailable { .. } | Self::InvalidConfig { .. } => {
                RetryClass::Never
            }
        }
    }

    pub(crate) fn transport(source_id: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }
}
