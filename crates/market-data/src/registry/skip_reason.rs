//! Skip reason tracking for source selection diagnostics.

use serde::Serialize;

use crate::models::{PriorityClass, SourceTier};

/// Why a source was skipped during a fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SkipReason {
    /// Circuit breaker is open (or a half-open trial is already in flight).
    CircuitBreakerOpen,

    /// The source's spacing would not allow a request before the deadline.
    RequestTooSoon,

    /// The caller's deadline expired before this source was reached.
    DeadlineExpired,

    /// The priority budget was exhausted, so no live sources were tried.
    BudgetExhausted { priority: PriorityClass },

    /// Source id in a route has no registered adapter.
    UnknownSource,
}

/// Record of a single source attempt during a fetch.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub source_id: String,
    pub tier: Option<SourceTier>,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
    pub success: bool,
}

/// Per-call record of every source considered, in order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<SourceAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, source_id: &str, tier: Option<SourceTier>, reason: SkipReason) {
        self.attempts.push(SourceAttempt {
            source_id: source_id.to_string(),
            tier,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, source_id: &str, tier: SourceTier, error: String) {
        self.attempts.push(SourceAttempt {
            source_id: source_id.to_string(),
            tier: Some(tier),
            skipped: None,
            error: Some(error),
            success: false,
        });
    }

    pub fn record_success(&mut self, source_id: &str, tier: SourceTier) {
        self.attempts.push(SourceAttempt {
            source_id: source_id.to_string(),
            tier: Some(tier),
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no sources attempted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.source_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.source_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({})", a.source_id, err)
                } else {
                    format!("{}: UNKNOWN", a.source_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// Sources that actually received a network request.
    pub fn network_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| a.skipped.is_none()).count()
    }

    pub fn skip_reasons(&self) -> Vec<(&str, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (a.source_id.as_str(), s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_deref().map(|e| (a.source_id.as_str(), e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip(
            "BINANCE",
            Some(SourceTier::Primary),
            SkipReason::CircuitBreakerOpen,
        );
        diag.record_error("COINBASE", SourceTier::Fallback, "Timeout".to_string());
        diag.record_success("COINGECKO", SourceTier::Emergency);

        let summary = diag.summary();
        assert!(summary.contains("BINANCE: SKIPPED"));
        assert!(summary.contains("COINBASE: ERROR"));
        assert!(summary.contains("COINGECKO: SUCCESS"));
        assert_eq!(diag.network_attempts(), 2);
    }

    #[test]
    fn test_has_success() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip("BINANCE", None, SkipReason::DeadlineExpired);
        assert!(!diag.has_success());

        diag.record_success("COINBASE", SourceTier::Fallback);
        assert!(diag.has_success());
    }

    #[test]
    fn test_skip_reasons_and_errors() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip("A", None, SkipReason::CircuitBreakerOpen);
        diag.record_skip("B", None, SkipReason::RequestTooSoon);
        diag.record_error("C", SourceTier::Primary, "boom".to_string());

        assert_eq!(diag.skip_reasons().len(), 2);
        assert_eq!(diag.errors(), vec![("C", "boom")]);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(FetchDiagnostics::new().summary(), "no sources attempted");
    }
}
