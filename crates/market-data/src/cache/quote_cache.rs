//! In-memory last-known-good quote cache.
//!
//! Entries never expire on their own. Freshness belongs to the caller: every
//! lookup names the maximum age it accepts. Entries are overwritten by the
//! next validated fetch and only removed by [`QuoteCache::sweep`].

use std::time::{Duration, Instant};

use log::debug;

use crate::keyed::KeyedSlots;
use crate::models::Quote;

/// Cached quote plus bookkeeping.
#[derive(Debug)]
struct CacheEntry {
    quote: Quote,
    inserted_at: Instant,
    usage_count: u64,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }
}

/// Symbol -> last validated quote, one lock per symbol.
pub struct QuoteCache {
    entries: KeyedSlots<CacheEntry>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self {
            entries: KeyedSlots::new("quote cache"),
        }
    }

    /// Quote for `symbol` if it is at most `max_age` old.
    ///
    /// Counts as a use of the entry.
    pub fn get(&self, symbol: &str, max_age: Duration) -> Option<(Quote, Duration)> {
        self.get_at(symbol, max_age, Instant::now())
    }

    pub(crate) fn get_at(
        &self,
        symbol: &str,
        max_age: Duration,
        now: Instant,
    ) -> Option<(Quote, Duration)> {
        let slot = self.entries.get(symbol)?;
        let mut entry = self.entries.lock(&slot);
        let age = entry.age(now);
        if age > max_age {
            return None;
        }
        entry.usage_count += 1;
        Some((entry.quote.clone(), age))
    }

    /// Quote for `symbol` regardless of the caller's max age, as long as it is
    /// younger than `absolute_ceiling`. Only for fallback paths.
    pub fn get_best_available(
        &self,
        symbol: &str,
        absolute_ceiling: Duration,
    ) -> Option<(Quote, Duration)> {
        self.get_best_available_at(symbol, absolute_ceiling, Instant::now())
    }

    pub(crate) fn get_best_available_at(
        &self,
        symbol: &str,
        absolute_ceiling: Duration,
        now: Instant,
    ) -> Option<(Quote, Duration)> {
        let slot = self.entries.get(symbol)?;
        let mut entry = self.entries.lock(&slot);
        let age = entry.age(now);
        if age >= absolute_ceiling {
            debug!(
                "Quote cache: entry for '{}' is {:?} old, beyond ceiling {:?}",
                symbol, age, absolute_ceiling
            );
            return None;
        }
        entry.usage_count += 1;
        Some((entry.quote.clone(), age))
    }

    /// Last cached quote with its age, without counting a use.
    pub fn peek(&self, symbol: &str) -> Option<(Quote, Duration)> {
        let slot = self.entries.get(symbol)?;
        let entry = self.entries.lock(&slot);
        Some((entry.quote.clone(), entry.age(Instant::now())))
    }

    /// Store a validated quote, overwriting whatever was cached.
    pub fn put(&self, symbol: &str, quote: Quote) {
        self.put_at(symbol, quote, Instant::now());
    }

    pub(crate) fn put_at(&self, symbol: &str, quote: Quote, inserted_at: Instant) {
        // Replaced wholesale, never field by field
        self.entries.replace(
            symbol,
            CacheEntry {
                quote,
                inserted_at,
                usage_count: 0,
            },
        );
    }

    /// Remove entries older than `ceiling`. Returns how many were removed.
    pub fn sweep(&self, ceiling: Duration) -> usize {
        let now = Instant::now();
        let removed = self.entries.retain(|entry| entry.age(now) <= ceiling);
        if removed > 0 {
            debug!("Quote cache: swept {} entries older than {:?}", removed, ceiling);
        }
        removed
    }

    /// How many times the entry for `symbol` was served.
    pub fn usage_count(&self, symbol: &str) -> u64 {
        self.entries
            .get(symbol)
            .map(|slot| self.entries.lock(&slot).usage_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new()
    }
}
