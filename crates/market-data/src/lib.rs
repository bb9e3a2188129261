//! Tradebot Market Data Crate
//!
//! Resilient multi-source price acquisition for the trading bot. Callers
//! (exit logic, entry logic, discovery scans) ask for a quote with a
//! priority class and a deadline and get back either a validated quote
//! tagged with its origin or a typed error.
//!
//! # Overview
//!
//! The crate supports:
//! - Multiple sources per symbol in priority order: Binance, Coinbase, CoinGecko
//! - Circuit breaking and minimum request spacing per source
//! - Request budgets and freshness policies per caller priority
//! - Price sanity validation before anything is cached
//! - Staged fallback down to stale cache entries
//!
//! # Architecture
//!
//! ```text
//!     caller (symbol, priority, deadline)
//!                  |
//!                  v
//!     +-------------------------+      +--------------+
//!     | AcquisitionCoordinator  | ---> |  QuoteCache  |  (fresh? return)
//!     +-------------------------+      +--------------+
//!                  |
//!                  v
//!     +-------------------------+
//!     |       RateBudget        |  (per priority class)
//!     +-------------------------+
//!                  |
//!                  v
//!     +-------------------------+
//!     | CircuitBreaker + Spacer |  (per source)
//!     +-------------------------+
//!                  |
//!                  v
//!     +-------------------------+
//!     |      QuoteSource        |  (Binance, Coinbase, CoinGecko)
//!     +-------------------------+
//!                  |
//!                  v
//!     +-------------------------+
//!     |     PriceValidator      |  -> cache -> AcquiredQuote
//!     +-------------------------+
//! ```
//!
//! # Core Types
//!
//! - [`AcquisitionCoordinator`] - The single query interface
//! - [`AcquisitionConfig`] - Sources, routes, policies and ceilings
//! - [`Quote`] / [`AcquiredQuote`] - Price observation and its origin
//! - [`PriorityClass`] - `CRITICAL_EXIT`, `NORMAL_ENTRY`, `DISCOVERY`
//! - [`QuoteSource`] - Trait implemented by every source

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

mod keyed;

pub use config::{AcquisitionConfig, FallbackConfig, PriorityPolicy, RoutesConfig};
pub use coordinator::{AcquisitionCoordinator, AcquisitionStatus, SourceStatus};
pub use errors::{MarketDataError, RetryClass};
pub use models::{AcquiredQuote, PriorityClass, Quote, QuoteOrigin, SourceTier};

// Re-export source types
pub use provider::binance::BinanceSource;
pub use provider::coinbase::CoinbaseSource;
pub use provider::coingecko::CoinGeckoSource;
pub use provider::{build_sources, QuoteSource, SourceConfig, SourceKind};

// Re-export registry types
pub use registry::{
    CircuitBreaker, CircuitState, FetchDiagnostics, PriceBounds, PriceValidator, RateBudget,
    RequestSpacer, RequestSpacing, SkipReason, SpacingMode, ValidationSeverity,
};
