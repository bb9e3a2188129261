//! Minimum inter-request spacing per source.
//!
//! Each source declares how far apart its outbound calls must be. A caller
//! arriving early either waits for its reserved slot (bounded by its
//! deadline) or fails fast with `RequestTooSoon`, depending on the source's
//! [`SpacingMode`]. Reservations are made under the source's lock and the
//! wait happens outside it, so a burst of callers is serialized onto
//! consecutive slots without blocking callers of other sources.

use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::keyed::KeyedSlots;

/// What to do with a request that arrives before the spacing elapsed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpacingMode {
    /// Wait for the next free slot if it falls before the caller's deadline.
    #[default]
    Wait,
    /// Reject immediately.
    FailFast,
}

/// Spacing rule declared by a source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestSpacing {
    /// Minimum delay between two outbound requests.
    pub min_interval: Duration,
    pub mode: SpacingMode,
}

impl Default for RequestSpacing {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            mode: SpacingMode::Wait,
        }
    }
}

/// Next free slot for a single source.
#[derive(Debug)]
struct SpacingSlot {
    rule: RequestSpacing,
    next_allowed_at: Option<Instant>,
}

/// Thread-safe request spacer for multiple sources.
pub struct RequestSpacer {
    slots: KeyedSlots<SpacingSlot>,
}

impl RequestSpacer {
    pub fn new() -> Self {
        Self {
            slots: KeyedSlots::new("request spacer"),
        }
    }

    /// Configure the spacing rule for a source, resetting its slot.
    pub fn configure(&self, source: &str, rule: RequestSpacing) {
        let slot = self.slots.get_or_insert_with(source, || SpacingSlot {
            rule,
            next_allowed_at: None,
        });
        let mut slot = self.slots.lock(&slot);
        slot.rule = rule;
        slot.next_allowed_at = None;
    }

    /// Reserve the next slot for `source`.
    ///
    /// Returns how long the caller must wait before sending. Errors with
    /// `RequestTooSoon` when the mode is fail-fast or the slot would start
    /// after `deadline`. Unconfigured sources are never spaced.
    pub(crate) fn reserve_at(
        &self,
        source: &str,
        now: Instant,
        deadline: Instant,
    ) -> Result<Duration, MarketDataError> {
        let Some(slot) = self.slots.get(source) else {
            return Ok(Duration::ZERO);
        };
        let mut slot = self.slots.lock(&slot);
        let interval = slot.rule.min_interval;

        let start = match slot.next_allowed_at {
            Some(next) if next > now => next,
            _ => now,
        };
        let wait = start.duration_since(now);

        if !wait.is_zero() && (slot.rule.mode == SpacingMode::FailFast || start > deadline) {
            debug!(
                "Request spacer: '{}' not ready for another {:?} ({:?})",
                source, wait, slot.rule.mode
            );
            return Err(MarketDataError::RequestTooSoon {
                source_id: source.to_string(),
            });
        }

        slot.next_allowed_at = Some(start + interval);
        Ok(wait)
    }

    /// Reserve a slot and wait for it (asynchronously).
    pub async fn acquire(&self, source: &str, deadline: Instant) -> Result<(), MarketDataError> {
        let wait = self.reserve_at(source, Instant::now(), deadline)?;
        if !wait.is_zero() {
            debug!("Request spacer: waiting {:?} for source '{}'", wait, source);
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    /// Time until `source` accepts another request without waiting.
    pub fn time_until_ready(&self, source: &str) -> Duration {
        let now = Instant::now();
        self.slots
            .get(source)
            .and_then(|slot| self.slots.lock(&slot).next_allowed_at)
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RequestSpacer {
    fn default() -> Self {
        Self::new()
    }
}
