//! Source protection and quote checking.
//!
//! This module provides the building blocks the coordinator orchestrates:
//! - Circuit breaking per source
//! - Minimum request spacing per source
//! - Request budgets per caller priority
//! - Price validation
//! - Fetch diagnostics

mod circuit_breaker;
mod rate_budget;
mod request_spacer;
mod skip_reason;
mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use rate_budget::{BudgetConfig, BudgetStatus, RateBudget};
pub use request_spacer::{RequestSpacer, RequestSpacing, SpacingMode};
pub use skip_reason::{FetchDiagnostics, SkipReason, SourceAttempt};
pub use validator::{
    DeviationPolicy, DeviationRule, PriceBounds, PriceValidator, ValidationIssue,
    ValidationSeverity, ValidatorConfig,
};
