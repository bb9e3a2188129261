//! Price sanity validation.
//!
//! Validates prices returned by sources before they are cached or returned:
//! - Finite and strictly positive
//! - Inside per-symbol bounds when configured
//! - Below a global sanity ceiling otherwise
//! - Within a maximum deviation from the previous quote (per-symbol policy)
//!
//! Volume oddities are soft warnings only.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::Quote;
use crate::provider::normalize_symbol;

/// Default global ceiling for symbols without bounds.
const DEFAULT_MAX_PRICE: f64 = 1_000_000_000.0;

/// Default maximum move from the previous quote before the deviation rule triggers.
const DEFAULT_MAX_DEVIATION_PCT: f64 = 25.0;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject quote, try next source.
    Hard,
    /// Soft warning - accept quote but log warning.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

/// What to do when a price moves too far from the previous quote.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviationPolicy {
    Off,
    /// Log and accept.
    #[default]
    Warn,
    /// Reject as a validation failure.
    Reject,
}

/// Flash-glitch protection relative to the previous quote.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviationRule {
    pub policy: DeviationPolicy,
    pub max_pct: f64,
}

impl Default for DeviationRule {
    fn default() -> Self {
        Self {
            policy: DeviationPolicy::Warn,
            max_pct: DEFAULT_MAX_DEVIATION_PCT,
        }
    }
}

/// Optional per-symbol sanity range.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBounds {
    pub symbol: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Overrides the global deviation rule for this symbol.
    #[serde(default)]
    pub deviation: Option<DeviationRule>,
}

impl PriceBounds {
    pub fn range(symbol: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            symbol: symbol.into(),
            min: Some(min),
            max: Some(max),
            deviation: None,
        }
    }
}

/// Price validator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidatorConfig {
    /// Ceiling applied when a symbol has no configured max.
    pub max_price: f64,
    pub bounds: Vec<PriceBounds>,
    /// Deviation rule for symbols without their own.
    pub deviation: DeviationRule,
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price: DEFAULT_MAX_PRICE,
            bounds: Vec::new(),
            deviation: DeviationRule::default(),
            warn_on_zero_volume: true,
        }
    }
}

/// Price validator.
///
/// Pure function of its inputs and static configuration; the only side
/// effect is logging soft warnings.
pub struct PriceValidator {
    max_price: f64,
    bounds: HashMap<String, PriceBounds>,
    deviation: DeviationRule,
    warn_on_zero_volume: bool,
}

impl PriceValidator {
    /// Create a new validator with default configuration.
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    /// Create a validator with custom configuration.
    pub fn with_config(config: ValidatorConfig) -> Self {
        let bounds = config
            .bounds
            .into_iter()
            .map(|b| (normalize_symbol(&b.symbol), b))
            .collect();
        Self {
            max_price: config.max_price,
            bounds,
            deviation: config.deviation,
            warn_on_zero_volume: config.warn_on_zero_volume,
        }
    }

    /// Validate a raw price for `symbol`.
    ///
    /// `previous` is the reference quote for the deviation rule, if any.
    pub fn validate(
        &self,
        symbol: &str,
        price: f64,
        previous: Option<&Quote>,
    ) -> Result<(), MarketDataError> {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        self.validate_price(symbol, price, &mut issues);
        if issues.is_empty() {
            self.validate_deviation(symbol, price, previous, &mut issues);
        }

        Self::finish(symbol, price, issues)
    }

    /// Validate a full quote: price rules plus volume warnings.
    pub fn validate_quote(
        &self,
        quote: &Quote,
        previous: Option<&Quote>,
    ) -> Result<(), MarketDataError> {
        let mut issues: Vec<ValidationIssue> = Vec::new();

        self.validate_price(quote.symbol(), quote.price(), &mut issues);
        if issues.is_empty() {
            self.validate_deviation(quote.symbol(), quote.price(), previous, &mut issues);
        }
        self.validate_volume(quote, &mut issues);

        Self::finish(quote.symbol(), quote.price(), issues)
    }

    fn finish(symbol: &str, price: f64, issues: Vec<ValidationIssue>) -> Result<(), MarketDataError> {
        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                symbol: symbol.to_string(),
                price,
                reason: errors.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Price validation warning for {}: {}", symbol, issue.message);
        }

        Ok(())
    }

    fn validate_price(&self, symbol: &str, price: f64, issues: &mut Vec<ValidationIssue>) {
        if !price.is_finite() {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: "non-finite price".to_string(),
            });
            return;
        }
        if price <= 0.0 {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: "non-positive price".to_string(),
            });
            return;
        }

        let bounds = self.bounds.get(&normalize_symbol(symbol));

        if let Some(min) = bounds.and_then(|b| b.min) {
            if price < min {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!("below min {}", min),
                });
            }
        }

        match bounds.and_then(|b| b.max) {
            Some(max) if price > max => issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("above max {}", max),
            }),
            Some(_) => {}
            None if price > self.max_price => issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("above sanity ceiling {}", self.max_price),
            }),
            None => {}
        }
    }

    fn validate_deviation(
        &self,
        symbol: &str,
        price: f64,
        previous: Option<&Quote>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let rule = self
            .bounds
            .get(&normalize_symbol(symbol))
            .and_then(|b| b.deviation)
            .unwrap_or(self.deviation);

        let severity = match rule.policy {
            DeviationPolicy::Off => return,
            DeviationPolicy::Warn => ValidationSeverity::Soft,
            DeviationPolicy::Reject => ValidationSeverity::Hard,
        };

        let Some(reference) = previous.map(|q| q.price()).filter(|p| p.is_finite() && *p > 0.0)
        else {
            return;
        };

        let deviation_pct = ((price - reference) / reference).abs() * 100.0;
        if deviation_pct > rule.max_pct {
            issues.push(ValidationIssue {
                severity,
                message: format!(
                    "deviation {:.2}% from previous {} exceeds {}%",
                    deviation_pct, reference, rule.max_pct
                ),
            });
        }
    }

    fn validate_volume(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if let Some(volume) = quote.volume() {
            if !volume.is_finite() || volume < 0.0 {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!("Unusable volume: {}", volume),
                });
            } else if self.warn_on_zero_volume && volume == 0.0 {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: "Zero volume".to_string(),
                });
            }
        }
    }
}

impl Default for PriceValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_quote(symbol: &str, price: f64) -> Quote {
        Quote::new(symbol, price, Utc::now(), "TEST")
    }

    fn reason_of(result: Result<(), MarketDataError>) -> String {
        match result {
            Err(MarketDataError::ValidationFailed { reason, .. }) => reason,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_price() {
        let validator = PriceValidator::new();
        assert!(validator.validate("BTCUSD", 64_000.0, None).is_ok());
    }

    #[test]
    fn test_non_positive_rejected() {
        let validator = PriceValidator::new();
        assert!(reason_of(validator.validate("BTCUSD", 0.0, None)).contains("non-positive"));
        assert!(reason_of(validator.validate("BTCUSD", -5.0, None)).contains("non-positive"));
    }

    #[test]
    fn test_non_finite_rejected() {
        let validator = PriceValidator::new();
        for price in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(reason_of(validator.validate("BTCUSD", price, None)).contains("non-finite"));
        }
    }

    #[test]
    fn test_bounds_above_max() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            bounds: vec![PriceBounds::range("ABCUSD", 10.0, 100.0)],
            ..Default::default()
        });

        let result = validator.validate("ABCUSD", 500.0, None);
        assert!(reason_of(result).contains("above max"));
        assert!(validator.validate("ABCUSD", 50.0, None).is_ok());
        assert!(validator.validate("ABCUSD", 100.0, None).is_ok());
    }

    #[test]
    fn test_bounds_below_min() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            bounds: vec![PriceBounds::range("ABCUSD", 10.0, 100.0)],
            ..Default::default()
        });

        assert!(reason_of(validator.validate("ABCUSD", 9.99, None)).contains("below min"));
    }

    #[test]
    fn test_bounds_lookup_is_case_insensitive() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            bounds: vec![PriceBounds::range("abcusd", 10.0, 100.0)],
            ..Default::default()
        });

        assert!(validator.validate("ABCUSD", 500.0, None).is_err());
    }

    #[test]
    fn test_bounds_lookup_ignores_separators() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            bounds: vec![
                PriceBounds::range("ABC-USD", 10.0, 100.0),
                PriceBounds::range("btc/usd", 1_000.0, 500_000.0),
            ],
            ..Default::default()
        });

        assert!(reason_of(validator.validate("ABCUSD", 500.0, None)).contains("above max"));
        assert!(reason_of(validator.validate("abc_usd", 5.0, None)).contains("below min"));
        assert!(reason_of(validator.validate("BTCUSD", 10.0, None)).contains("below min"));
    }

    #[test]
    fn test_global_ceiling_without_bounds() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            max_price: 1_000_000.0,
            ..Default::default()
        });

        let result = validator.validate("XYZUSD", 2_000_000.0, None);
        assert!(reason_of(result).contains("above sanity ceiling"));
    }

    #[test]
    fn test_configured_max_replaces_global_ceiling() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            max_price: 1_000.0,
            bounds: vec![PriceBounds::range("BIGUSD", 1.0, 10_000.0)],
            ..Default::default()
        });

        assert!(validator.validate("BIGUSD", 5_000.0, None).is_ok());
    }

    #[test]
    fn test_deviation_warn_accepts() {
        let validator = PriceValidator::new();
        let previous = make_quote("BTCUSD", 100.0);

        assert!(validator.validate("BTCUSD", 200.0, Some(&previous)).is_ok());
    }

    #[test]
    fn test_deviation_reject() {
        let validator = PriceValidator::with_config(ValidatorConfig {
            deviation: DeviationRule {
                policy: DeviationPolicy::Reject,
                max_pct: 10.0,
            },
            ..Default::default()
        });
        let previous = make_quote("BTCUSD", 100.0);

        assert!(validator.validate("BTCUSD", 109.0, Some(&previous)).is_ok());
        let reason = reason_of(validator.validate("BTCUSD", 120.0, Some(&previous)));
        assert!(reason.contains("deviation"));

        // Without a reference the rule does not apply
        assert!(validator.validate("BTCUSD", 120.0, None).is_ok());
    }

    #[test]
    fn test_deviation_disabled_per_symbol() {
        let mut bounds = PriceBounds::range("MEMEUSD", 0.000001, 10.0);
        bounds.deviation = Some(DeviationRule {
            policy: DeviationPolicy::Off,
            max_pct: 0.0,
        });
        let validator = PriceValidator::with_config(ValidatorConfig {
            bounds: vec![bounds],
            deviation: DeviationRule {
                policy: DeviationPolicy::Reject,
                max_pct: 5.0,
            },
            ..Default::default()
        });
        let previous = make_quote("MEMEUSD", 0.01);

        assert!(validator.validate("MEMEUSD", 0.05, Some(&previous)).is_ok());
    }

    #[test]
    fn test_volume_issues_are_soft() {
        let validator = PriceValidator::new();
        let quote = make_quote("BTCUSD", 64_000.0).with_volume(0.0);
        assert!(validator.validate_quote(&quote, None).is_ok());

        let quote = make_quote("BTCUSD", 64_000.0).with_volume(f64::NAN);
        assert!(validator.validate_quote(&quote, None).is_ok());
    }

    #[test]
    fn test_validate_quote_rejects_bad_price() {
        let validator = PriceValidator::new();
        let quote = make_quote("BTCUSD", -1.0);

        assert!(matches!(
            validator.validate_quote(&quote, None),
            Err(MarketDataError::ValidationFailed { ref symbol, .. }) if symbol == "BTCUSD"
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config: ValidatorConfig = serde_json::from_str(
            r#"{
                "maxPrice": 5000000,
                "bounds": [{"symbol": "ABCUSD", "min": 10, "max": 100}],
                "deviation": {"policy": "reject", "maxPct": 15}
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_price, 5_000_000.0);
        assert_eq!(config.bounds.len(), 1);
        assert_eq!(config.deviation.policy, DeviationPolicy::Reject);
        assert!(config.warn_on_zero_volume);
    }
}
