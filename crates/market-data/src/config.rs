//! Acquisition layer configuration.
//!
//! Loaded once at startup from JSON. Every section has defaults, so an empty
//! object (`{}`) is a valid configuration using Binance, Coinbase and
//! CoinGecko with the built-in policies.
//!
//! ```json
//! {
//!   "sources": [{"kind": "binance"}, {"kind": "coinbase"}, {"kind": "coingecko"}],
//!   "routes": {
//!     "default": ["BINANCE", "COINBASE", "COINGECKO"],
//!     "classes": [{"name": "majors", "symbols": ["BTCUSD"], "sources": ["COINBASE", "BINANCE"]}]
//!   },
//!   "priorities": {"DISCOVERY": {"capacity": 10, "maxAgeMs": 600000}},
//!   "validator": {"bounds": [{"symbol": "BTCUSD", "min": 1000, "max": 1000000}]},
//!   "breaker": {"failureThreshold": 5},
//!   "fallback": {"staleCeilingMs": 45000}
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::errors::MarketDataError;
use crate::models::PriorityClass;
use crate::provider::{normalize_symbol, SourceConfig, SourceKind};
use crate::registry::{BudgetConfig, CircuitBreakerConfig, ValidatorConfig};

const DEFAULT_BUDGET_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_STALE_CEILING: Duration = Duration::from_secs(30);
const DEFAULT_EMERGENCY_CEILING: Duration = Duration::from_secs(300);
const DEFAULT_EMERGENCY_DEADLINE: Duration = Duration::from_secs(5);
const DEFAULT_SWEEP_CEILING: Duration = Duration::from_secs(600);
const MAX_COOLDOWN_MULTIPLIER: f64 = 100.0;

/// Budget and freshness policy for one priority class.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PriorityPolicy {
    /// Requests allowed per window.
    pub capacity: u32,
    pub window: Duration,
    /// Oldest cached quote the class accepts without going to the network.
    pub max_age: Duration,
}

impl PriorityPolicy {
    /// Built-in policy for a class.
    pub fn defaults_for(priority: PriorityClass) -> Self {
        let (capacity, max_age) = match priority {
            PriorityClass::CriticalExit => (120, Duration::from_secs(15)),
            PriorityClass::NormalEntry => (60, Duration::from_secs(60)),
            PriorityClass::Discovery => (20, Duration::from_secs(300)),
        };
        Self {
            capacity,
            window: DEFAULT_BUDGET_WINDOW,
            max_age,
        }
    }

    pub fn budget(&self) -> BudgetConfig {
        BudgetConfig {
            capacity: self.capacity,
            window: self.window,
        }
    }
}

/// Partial override of a [`PriorityPolicy`]; missing fields keep the class default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityOverride {
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub max_age_ms: Option<u64>,
}

/// Ordered source list for a named group of symbols.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolClassRoute {
    pub name: String,
    pub symbols: Vec<String>,
    pub sources: Vec<String>,
}

/// Which sources are tried, in which order, for which symbols.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutesConfig {
    /// Route for symbols outside every class. Empty means all sources in
    /// configuration order.
    pub default: Vec<String>,
    pub classes: Vec<SymbolClassRoute>,
}

/// Absolute age limits for fallback paths.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FallbackConfig {
    /// Oldest stale entry `get_quote` may return after exhausting sources.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "staleCeilingMs")]
    pub stale_ceiling: Duration,
    /// Same, for emergency exits.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "emergencyCeilingMs")]
    pub emergency_ceiling: Duration,
    /// Deadline given to the live attempts of an emergency exit.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "emergencyDeadlineMs")]
    pub emergency_deadline: Duration,
    /// Entries older than this are removed by the cache sweep.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "sweepCeilingMs")]
    pub sweep_ceiling: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            stale_ceiling: DEFAULT_STALE_CEILING,
            emergency_ceiling: DEFAULT_EMERGENCY_CEILING,
            emergency_deadline: DEFAULT_EMERGENCY_DEADLINE,
            sweep_ceiling: DEFAULT_SWEEP_CEILING,
        }
    }
}

/// Complete configuration of the acquisition layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcquisitionConfig {
    pub sources: Vec<SourceConfig>,
    pub routes: RoutesConfig,
    pub priorities: HashMap<PriorityClass, PriorityOverride>,
    pub validator: ValidatorConfig,
    pub breaker: CircuitBreakerConfig,
    pub fallback: FallbackConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig::new(SourceKind::Binance),
                SourceConfig::new(SourceKind::Coinbase),
                SourceConfig::new(SourceKind::Coingecko),
            ],
            routes: RoutesConfig::default(),
            priorities: HashMap::new(),
            validator: ValidatorConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, MarketDataError> {
        let config: Self = serde_json::from_str(json).map_err(|e| MarketDataError::InvalidConfig {
            message: format!("Failed to parse configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| MarketDataError::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    /// Effective policy for a priority class.
    pub fn policy(&self, priority: PriorityClass) -> PriorityPolicy {
        let defaults = PriorityPolicy::defaults_for(priority);
        match self.priorities.get(&priority) {
            Some(o) => PriorityPolicy {
                capacity: o.capacity.unwrap_or(defaults.capacity),
                window: o.window_ms.map(Duration::from_millis).unwrap_or(defaults.window),
                max_age: o.max_age_ms.map(Duration::from_millis).unwrap_or(defaults.max_age),
            },
            None => defaults,
        }
    }

    /// Budget configuration for every class.
    pub fn budgets(&self) -> HashMap<PriorityClass, BudgetConfig> {
        PriorityClass::ALL
            .iter()
            .map(|p| (*p, self.policy(*p).budget()))
            .collect()
    }

    /// Ordered source ids for a symbol.
    ///
    /// First symbol class listing the symbol wins, then the default route.
    /// `None` means every registered source in registration order.
    pub fn route_for(&self, symbol: &str) -> Option<&[String]> {
        let symbol = normalize_symbol(symbol);
        if let Some(class) = self
            .routes
            .classes
            .iter()
            .find(|c| c.symbols.iter().any(|s| normalize_symbol(s) == symbol))
        {
            return Some(&class.sources);
        }
        if !self.routes.default.is_empty() {
            return Some(&self.routes.default);
        }
        None
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        let invalid = |message: String| Err(MarketDataError::InvalidConfig { message });

        if self.sources.is_empty() {
            return invalid("At least one source must be configured".to_string());
        }

        let mut ids = HashSet::new();
        for source in &self.sources {
            let id = source.source_id();
            if !ids.insert(id.clone()) {
                return invalid(format!("Duplicate source id: {}", id));
            }
        }

        let routes = std::iter::once(("default", &self.routes.default)).chain(
            self.routes
                .classes
                .iter()
                .map(|c| (c.name.as_str(), &c.sources)),
        );
        for (name, sources) in routes {
            if let Some(unknown) = sources.iter().find(|s| !ids.contains(s.as_str())) {
                return invalid(format!("Route '{}' references unknown source {}", name, unknown));
            }
        }
        if let Some(class) = self.routes.classes.iter().find(|c| c.sources.is_empty()) {
            return invalid(format!("Route '{}' has no sources", class.name));
        }

        for priority in PriorityClass::ALL {
            if self.policy(priority).window.is_zero() {
                return invalid(format!("Budget window for {} must be positive", priority));
            }
        }

        if self.breaker.failure_threshold == 0 {
            return invalid("breaker.failureThreshold must be at least 1".to_string());
        }
        let multiplier = self.breaker.cooldown_multiplier;
        if !(1.0..=MAX_COOLDOWN_MULTIPLIER).contains(&multiplier) {
            return invalid(format!(
                "breaker.cooldownMultiplier must be between 1.0 and {}",
                MAX_COOLDOWN_MULTIPLIER
            ));
        }
        if self.breaker.max_cooldown < self.breaker.cooldown {
            return invalid("breaker.maxCooldownMs must not be below cooldownMs".to_string());
        }

        if !(self.validator.max_price.is_finite() && self.validator.max_price > 0.0) {
            return invalid("validator.maxPrice must be a positive number".to_string());
        }
        for bounds in &self.validator.bounds {
            if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
                if min > max {
                    return invalid(format!(
                        "Bounds for {}: min {} is above max {}",
                        bounds.symbol, min, max
                    ));
                }
            }
        }

        if self.fallback.emergency_deadline.is_zero() {
            return invalid("fallback.emergencyDeadlineMs must be positive".to_string());
        }

        Ok(())
    }
}
