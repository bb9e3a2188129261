//! Per-source circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop calling a source that keeps
//! failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Source is failing, requests are blocked until `next_probe_at`.
//! - **HalfOpen**: One trial request is allowed to test recovery.
//!
//! Open -> HalfOpen happens lazily on the next `allow_request` call, there is
//! no background timer. A failed trial reopens the circuit with a longer
//! cooldown (multiplied, capped at `max_cooldown`).
//!
//! The circuit breaker is in-memory and resets on process restart.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::keyed::KeyedSlots;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Default cooldown before the first probe.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Default upper bound for the growing cooldown.
const DEFAULT_MAX_COOLDOWN: Duration = Duration::from_secs(600);

/// Default growth factor applied after a failed trial.
const DEFAULT_COOLDOWN_MULTIPLIER: f64 = 2.0;

/// A trial outstanding longer than this is treated as abandoned.
const DEFAULT_TRIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Source is failing - requests are blocked.
    Open,
    /// Testing recovery - a single trial request is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit record for a single source.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    next_probe_at: Option<Instant>,
    /// Cooldown that the next opening will use.
    cooldown: Duration,
    /// Start of the outstanding HalfOpen trial, if any.
    trial_started_at: Option<Instant>,
}

impl Circuit {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            next_probe_at: None,
            cooldown: config.cooldown,
            trial_started_at: None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.next_probe_at = Some(now + self.cooldown);
        self.trial_started_at = None;
    }
}

/// Circuit breaker configuration.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Cooldown before the first probe after opening.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cooldownMs")]
    pub cooldown: Duration,
    /// Cap for the cooldown after repeated failed probes.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "maxCooldownMs")]
    pub max_cooldown: Duration,
    /// Growth factor applied to the cooldown when a trial fails.
    pub cooldown_multiplier: f64,
    /// How long a HalfOpen trial may stay outstanding before another is allowed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "trialTimeoutMs")]
    pub trial_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
            cooldown_multiplier: DEFAULT_COOLDOWN_MULTIPLIER,
            trial_timeout: DEFAULT_TRIAL_TIMEOUT,
        }
    }
}

/// Per-source circuit breaker.
///
/// Thread-safe: every source has its own mutex and each public method is a
/// single critical section on it.
pub struct CircuitBreaker {
    circuits: KeyedSlots<Circuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: KeyedSlots::new("circuit breaker"),
            config,
        }
    }

    /// Check whether a request may be sent to `source`.
    ///
    /// - Closed: always true.
    /// - Open: false until `next_probe_at`; at or after it the circuit moves
    ///   to HalfOpen and exactly this caller gets the trial.
    /// - HalfOpen: true only if no trial is outstanding.
    pub fn allow_request(&self, source: &str) -> bool {
        self.allow_request_at(source, Instant::now())
    }

    pub(crate) fn allow_request_at(&self, source: &str, now: Instant) -> bool {
        let slot = self
            .circuits
            .get_or_insert_with(source, || Circuit::new(&self.config));
        let mut circuit = self.circuits.lock(&slot);

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::Open => match circuit.next_probe_at {
                Some(probe_at) if now >= probe_at => {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        source
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_started_at = Some(now);
                    true
                }
                _ => false,
            },
            CircuitState::HalfOpen => match circuit.trial_started_at {
                None => {
                    circuit.trial_started_at = Some(now);
                    true
                }
                Some(started) if now.duration_since(started) >= self.config.trial_timeout => {
                    warn!(
                        "Circuit breaker: trial for '{}' abandoned after {:?}, allowing a new one",
                        source, self.config.trial_timeout
                    );
                    circuit.trial_started_at = Some(now);
                    true
                }
                Some(_) => false,
            },
        }
    }

    /// Record a successful request for a source.
    ///
    /// Resets the failure count and closes the circuit from any state.
    pub fn record_success(&self, source: &str) {
        let slot = self
            .circuits
            .get_or_insert_with(source, || Circuit::new(&self.config));
        let mut circuit = self.circuits.lock(&slot);

        if circuit.state != CircuitState::Closed {
            info!(
                "Circuit breaker: closing circuit for '{}' after successful trial",
                source
            );
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
        circuit.next_probe_at = None;
        circuit.trial_started_at = None;
        circuit.cooldown = self.config.cooldown;
    }

    /// Record a failed request for a source.
    ///
    /// Opens the circuit once the threshold is reached. Any failure in
    /// HalfOpen reopens it with a grown cooldown.
    pub fn record_failure(&self, source: &str) {
        self.record_failure_at(source, Instant::now());
    }

    pub(crate) fn record_failure_at(&self, source: &str, now: Instant) {
        let slot = self
            .circuits
            .get_or_insert_with(source, || Circuit::new(&self.config));
        let mut circuit = self.circuits.lock(&slot);

        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures (cooldown {:?})",
                        source, circuit.consecutive_failures, circuit.cooldown
                    );
                    circuit.open(now);
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        source, circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                circuit.cooldown = grow_cooldown(
                    circuit.cooldown,
                    self.config.cooldown_multiplier,
                    self.config.max_cooldown,
                );
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failed trial (cooldown {:?})",
                    source, circuit.cooldown
                );
                circuit.open(now);
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    source
                );
            }
        }
    }

    /// Release a HalfOpen trial that never reached the network.
    pub fn abandon_trial(&self, source: &str) {
        if let Some(slot) = self.circuits.get(source) {
            let mut circuit = self.circuits.lock(&slot);
            if circuit.state == CircuitState::HalfOpen {
                circuit.trial_started_at = None;
            }
        }
    }

    /// Get the current state for a source.
    ///
    /// Read-only: an expired Open circuit is still reported as Open until the
    /// next `allow_request`.
    pub fn state(&self, source: &str) -> CircuitState {
        self.circuits
            .get(source)
            .map(|slot| self.circuits.lock(&slot).state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the consecutive failure count for a source.
    pub fn failure_count(&self, source: &str) -> u32 {
        self.circuits
            .get(source)
            .map(|slot| self.circuits.lock(&slot).consecutive_failures)
            .unwrap_or(0)
    }

    /// Reset the circuit for a source to Closed state.
    pub fn reset(&self, source: &str) {
        if let Some(slot) = self.circuits.get(source) {
            info!("Circuit breaker: manually resetting circuit for '{}'", source);
            *self.circuits.lock(&slot) = Circuit::new(&self.config);
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        self.circuits.clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked sources.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let now = Instant::now();
        self.circuits
            .entries()
            .into_iter()
            .map(|(source, slot)| {
                let circuit = self.circuits.lock(&slot);
                CircuitMetrics {
                    source,
                    state: circuit.state,
                    failure_count: circuit.consecutive_failures,
                    opened_at: circuit.opened_at,
                    next_probe_in: circuit
                        .next_probe_at
                        .filter(|_| circuit.state == CircuitState::Open)
                        .map(|at| at.saturating_duration_since(now)),
                }
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug)]
pub struct CircuitMetrics {
    /// Source identifier.
    pub source: String,
    /// Current circuit state.
    pub state: CircuitState,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// When the circuit last opened.
    pub opened_at: Option<Instant>,
    /// Time until the next probe is allowed, when Open.
    pub next_probe_in: Option<Duration>,
}

/// Next cooldown after a failed trial, never above `max`.
///
/// Products that do not fit a `Duration` saturate at `max`.
fn grow_cooldown(cooldown: Duration, multiplier: f64, max: Duration) -> Duration {
    let multiplier = if multiplier.is_finite() {
        multiplier.max(1.0)
    } else {
        1.0
    };
    Duration::try_from_secs_f64(cooldown.as_secs_f64() * multiplier)
        .unwrap_or(max)
        .min(max)
}
