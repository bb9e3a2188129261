//! Acquisition coordinator.
//!
//! Orchestrates cache, budgets, circuit breakers, request spacing, sources
//! and validation into a single `get_quote` operation:
//!
//! 1. Cache hit within the priority's max age: return it, no budget used.
//! 2. Budget exhausted for the priority: go to step 5.
//! 3. Non-emergency sources of the symbol's route, in route order. Each is
//!    guarded by its breaker and spacer, gets only the remaining deadline,
//!    and its quote is validated before it is cached and returned.
//! 4. Emergency sources, same sequence.
//! 5. Best available cache entry under the absolute ceiling, tagged stale,
//!    or `NoDataAvailable`.
//!
//! A failing source is never re-queried within one call; the coordinator
//! moves on to the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::cache::QuoteCache;
use crate::config::AcquisitionConfig;
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{AcquiredQuote, PriorityClass, QuoteOrigin, SourceTier};
use crate::provider::{build_sources, normalize_symbol, QuoteSource};
use crate::registry::{
    BudgetStatus, CircuitBreaker, CircuitState, FetchDiagnostics, PriceValidator, RateBudget,
    RequestSpacer, SkipReason,
};

/// Breaker view of one registered source.
#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub id: String,
    pub tier: SourceTier,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(rename = "nextProbeInMs")]
    pub next_probe_in: Option<Duration>,
}

/// Read-only snapshot of the coordinator's shared state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionStatus {
    pub sources: Vec<SourceStatus>,
    pub budgets: Vec<BudgetStatus>,
    pub cache_size: usize,
}

/// Single entry point for price acquisition.
///
/// Construct once and share behind an `Arc`; every method takes `&self`.
pub struct AcquisitionCoordinator {
    sources: Vec<Arc<dyn QuoteSource>>,
    config: AcquisitionConfig,
    cache: QuoteCache,
    breaker: CircuitBreaker,
    spacer: RequestSpacer,
    budget: RateBudget,
    validator: PriceValidator,
}

impl AcquisitionCoordinator {
    /// Create a coordinator over already built sources.
    ///
    /// Request spacing is configured from each source's declared spacing.
    /// `config.sources` is not used here; see [`Self::from_config`].
    pub fn new(config: AcquisitionConfig, sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        let spacer = RequestSpacer::new();
        for source in &sources {
            spacer.configure(source.id(), source.spacing());
        }

        let routed = std::iter::once(&config.routes.default)
            .chain(config.routes.classes.iter().map(|c| &c.sources))
            .flatten();
        for id in routed {
            if !sources.iter().any(|s| s.id() == id.as_str()) {
                warn!("Route references source '{}' which is not registered", id);
            }
        }

        Self {
            breaker: CircuitBreaker::with_config(config.breaker.clone()),
            budget: RateBudget::new(&config.budgets()),
            validator: PriceValidator::with_config(config.validator.clone()),
            cache: QuoteCache::new(),
            spacer,
            sources,
            config,
        }
    }

    /// Validate the configuration and build its sources.
    pub fn from_config(config: AcquisitionConfig) -> Result<Self, MarketDataError> {
        config.validate()?;
        let sources = build_sources(&config.sources)?;
        Ok(Self::new(config, sources))
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Get a quote for `symbol` on behalf of a `priority` caller.
    ///
    /// Only `NoDataAvailable` is returned as an error; every per-source
    /// failure is absorbed by moving on.
    pub async fn get_quote(
        &self,
        symbol: &str,
        priority: PriorityClass,
        deadline: Instant,
    ) -> Result<AcquiredQuote, MarketDataError> {
        self.get_quote_with_diagnostics(symbol, priority, deadline)
            .await
            .0
    }

    /// Same as [`Self::get_quote`], also returning every source decision made.
    pub async fn get_quote_with_diagnostics(
        &self,
        symbol: &str,
        priority: PriorityClass,
        deadline: Instant,
    ) -> (Result<AcquiredQuote, MarketDataError>, FetchDiagnostics) {
        let mut diagnostics = FetchDiagnostics::new();
        let result = self
            .acquire(
                symbol,
                priority,
                deadline,
                self.config.fallback.stale_ceiling,
                &mut diagnostics,
            )
            .await;
        (result, diagnostics)
    }

    /// Quote for unwinding a position.
    ///
    /// Runs the normal flow as `CRITICAL_EXIT` with the emergency deadline,
    /// then accepts cache entries up to the emergency ceiling instead of the
    /// regular stale ceiling.
    pub async fn get_emergency_exit_quote(
        &self,
        symbol: &str,
    ) -> Result<AcquiredQuote, MarketDataError> {
        let deadline = Instant::now() + self.config.fallback.emergency_deadline;
        let mut diagnostics = FetchDiagnostics::new();
        self.acquire(
            symbol,
            PriorityClass::CriticalExit,
            deadline,
            self.config.fallback.emergency_ceiling,
            &mut diagnostics,
        )
        .await
    }

    async fn acquire(
        &self,
        symbol: &str,
        priority: PriorityClass,
        deadline: Instant,
        stale_ceiling: Duration,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<AcquiredQuote, MarketDataError> {
        let symbol = normalize_symbol(symbol);
        let policy = self.config.policy(priority);

        if let Some((quote, age)) = self.cache.get(&symbol, policy.max_age) {
            debug!(
                "Cache hit for {} ({:?} old, {} accepts {:?})",
                symbol, age, priority, policy.max_age
            );
            return Ok(AcquiredQuote {
                quote,
                origin: QuoteOrigin::Cached { age },
            });
        }

        let route = self.route(&symbol, diagnostics);

        if self.budget.try_consume(priority) {
            let (regular, emergency): (Vec<_>, Vec<_>) = route
                .into_iter()
                .partition(|source| source.tier() != SourceTier::Emergency);

            for group in [regular, emergency] {
                if let Some(acquired) = self
                    .try_sources(&symbol, &group, deadline, diagnostics)
                    .await
                {
                    debug!("Acquired {}: {}", symbol, diagnostics.summary());
                    return Ok(acquired);
                }
            }
        } else {
            info!(
                "{}; skipping live sources for {}",
                MarketDataError::RateLimited { priority },
                symbol
            );
            for source in &route {
                diagnostics.record_skip(
                    source.id(),
                    Some(source.tier()),
                    SkipReason::BudgetExhausted { priority },
                );
            }
        }

        match self.cache.get_best_available(&symbol, stale_ceiling) {
            Some((quote, age)) => {
                warn!(
                    "Serving stale quote for {} from {} ({:?} old): {}",
                    symbol,
                    quote.source(),
                    age,
                    diagnostics.summary()
                );
                Ok(AcquiredQuote {
                    quote,
                    origin: QuoteOrigin::Stale { age },
                })
            }
            None => {
                warn!(
                    "No data available for {}: {}",
                    symbol,
                    diagnostics.summary()
                );
                Err(MarketDataError::NoDataAvailable { symbol })
            }
        }
    }

    /// Try `sources` in order, returning the first validated quote.
    async fn try_sources(
        &self,
        symbol: &str,
        sources: &[Arc<dyn QuoteSource>],
        deadline: Instant,
        diagnostics: &mut FetchDiagnostics,
    ) -> Option<AcquiredQuote> {
        for source in sources {
            let source_id = source.id();
            let tier = source.tier();

            if Instant::now() >= deadline {
                diagnostics.record_skip(source_id, Some(tier), SkipReason::DeadlineExpired);
                continue;
            }

            if !self.breaker.allow_request(source_id) {
                debug!("Circuit breaker open for source '{}', skipping", source_id);
                diagnostics.record_skip(source_id, Some(tier), SkipReason::CircuitBreakerOpen);
                continue;
            }

            if let Err(e) = self.spacer.acquire(source_id, deadline).await {
                debug!("{}, skipping", e);
                self.breaker.abandon_trial(source_id);
                diagnostics.record_skip(source_id, Some(tier), SkipReason::RequestTooSoon);
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.breaker.abandon_trial(source_id);
                diagnostics.record_skip(source_id, Some(tier), SkipReason::DeadlineExpired);
                continue;
            }

            debug!(
                "Fetching {} from source '{}' ({} left)",
                symbol,
                source_id,
                humanize(remaining)
            );
            let fetched = match tokio::time::timeout(remaining, source.fetch_quote(symbol, remaining))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(MarketDataError::RequestTimeout {
                    source_id: source_id.to_string(),
                }),
            };

            let checked = fetched.and_then(|quote| {
                let previous = self.cache.peek(symbol).map(|(previous, _)| previous);
                self.validator
                    .validate_quote(&quote, previous.as_ref())
                    .map(|()| quote)
            });

            match checked {
                Ok(quote) => {
                    self.breaker.record_success(source_id);
                    self.cache.put(symbol, quote.clone());
                    diagnostics.record_success(source_id, tier);
                    return Some(AcquiredQuote {
                        quote,
                        origin: QuoteOrigin::Live { tier },
                    });
                }
                Err(e) => {
                    match e.retry_class() {
                        RetryClass::FailoverWithPenalty => {
                            self.breaker.record_failure(source_id);
                            debug!(
                                "Source '{}' failed with {}, recorded circuit breaker failure",
                                source_id, e
                            );
                        }
                        RetryClass::NextProvider
                        | RetryClass::CircuitOpen
                        | RetryClass::Never => {
                            self.breaker.abandon_trial(source_id);
                            debug!("Source '{}' failed with {}, trying next source", source_id, e);
                        }
                    }
                    diagnostics.record_error(source_id, tier, e.to_string());
                }
            }
        }

        None
    }

    /// Sources for a symbol in route order. Unknown ids are recorded and dropped.
    fn route(&self, symbol: &str, diagnostics: &mut FetchDiagnostics) -> Vec<Arc<dyn QuoteSource>> {
        match self.config.route_for(symbol) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let source = self.source(id);
                    if source.is_none() {
                        diagnostics.record_skip(id, None, SkipReason::UnknownSource);
                    }
                    source
                })
                .collect(),
            None => self.sources.clone(),
        }
    }

    fn source(&self, id: &str) -> Option<Arc<dyn QuoteSource>> {
        self.sources.iter().find(|s| s.id() == id).cloned()
    }

    /// Breaker states, remaining budgets and cache size. No side effects.
    pub fn status(&self) -> AcquisitionStatus {
        let metrics: HashMap<_, _> = self
            .breaker
            .metrics()
            .into_iter()
            .map(|m| (m.source.clone(), m))
            .collect();

        let sources = self
            .sources
            .iter()
            .map(|source| {
                let metric = metrics.get(source.id());
                SourceStatus {
                    id: source.id().to_string(),
                    tier: source.tier(),
                    state: metric.map(|m| m.state).unwrap_or(CircuitState::Closed),
                    consecutive_failures: metric.map(|m| m.failure_count).unwrap_or(0),
                    next_probe_in: metric.and_then(|m| m.next_probe_in),
                }
            })
            .collect();

        AcquisitionStatus {
            sources,
            budgets: self.budget.snapshot(),
            cache_size: self.cache.len(),
        }
    }

    /// Close the breaker of one source. Returns false for unknown ids.
    pub fn reset_source(&self, source_id: &str) -> bool {
        if self.source(source_id).is_none() {
            return false;
        }
        self.breaker.reset(source_id);
        true
    }

    pub fn reset_all_sources(&self) {
        self.breaker.reset_all();
    }

    /// Remove cache entries older than the configured sweep ceiling.
    pub fn sweep_cache(&self) -> usize {
        let removed = self.cache.sweep(self.config.fallback.sweep_ceiling);
        if removed > 0 {
            info!("Swept {} expired quotes from cache", removed);
        }
        removed
    }
}

fn humanize(duration: Duration) -> String {
    if duration.as_secs() > 0 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
