//! Quote source trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Quote, SourceTier};
use crate::registry::RequestSpacing;

/// Trait for price sources.
///
/// Implement this trait to add support for a new market data source. A
/// source only fetches: the coordinator owns retries, circuit breaking,
/// spacing, validation and caching.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use tradebot_market_data::provider::QuoteSource;
///
/// struct MySource;
///
/// #[async_trait]
/// impl QuoteSource for MySource {
///     fn id(&self) -> &str {
///         "MY_SOURCE"
///     }
///
///     fn tier(&self) -> SourceTier {
///         SourceTier::Fallback
///     }
///
///     async fn fetch_quote(&self, symbol: &str, timeout: Duration) -> Result<Quote, MarketDataError> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Unique identifier for this source.
    ///
    /// Used for logging, circuit breaker tracking and routes.
    fn id(&self) -> &str;

    /// Declared trust tier. Emergency sources are held back until every
    /// other source of the route was tried or skipped.
    fn tier(&self) -> SourceTier;

    /// Minimum spacing between two outbound requests.
    ///
    /// Declared here, enforced by the coordinator's request spacer.
    fn spacing(&self) -> RequestSpacing {
        RequestSpacing::default()
    }

    /// Fetch the latest quote for a canonical symbol (e.g. `BTCUSD`).
    ///
    /// The returned quote carries the canonical symbol, not the provider's.
    /// `timeout` is what is left of the caller's deadline.
    async fn fetch_quote(&self, symbol: &str, timeout: Duration) -> Result<Quote, MarketDataError>;
}
