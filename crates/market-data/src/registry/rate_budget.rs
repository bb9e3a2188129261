//! Fixed-window request budgets per caller priority class.
//!
//! Every priority class gets its own capacity and window length. The window
//! resets on the first access after it elapsed; there is no background timer.
//! Fixed windows allow a burst of up to twice the capacity around a window
//! boundary. A sliding window or token bucket can replace [`Budget`] without
//! changing the [`RateBudget`] interface.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::models::PriorityClass;

/// Budget settings for one priority class.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BudgetConfig {
    pub capacity: u32,
    pub window: Duration,
}

#[derive(Debug)]
struct Budget {
    capacity: u32,
    consumed: u32,
    window_start: Instant,
    window: Duration,
}

impl Budget {
    fn new(config: BudgetConfig, now: Instant) -> Self {
        Self {
            capacity: config.capacity,
            consumed: 0,
            window_start: now,
            window: config.window,
        }
    }

    fn roll_window(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.consumed = 0;
            self.window_start = now;
        }
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.roll_window(now);
        if self.consumed < self.capacity {
            self.consumed += 1;
            true
        } else {
            false
        }
    }

    /// Remaining allowance as seen at `now`, without mutating the window.
    fn remaining(&self, now: Instant) -> u32 {
        if now.duration_since(self.window_start) >= self.window {
            self.capacity
        } else {
            self.capacity.saturating_sub(self.consumed)
        }
    }
}

/// Read-only view of one budget.
#[serde_as]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub priority: PriorityClass,
    pub capacity: u32,
    pub remaining: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "resetsInMs")]
    pub resets_in: Duration,
}

/// Request budgets keyed by priority class, one mutex each.
pub struct RateBudget {
    budgets: HashMap<PriorityClass, Mutex<Budget>>,
}

impl RateBudget {
    /// Create budgets for every priority class from `configs`.
    ///
    /// Classes missing from `configs` get a zero-capacity budget, i.e. they
    /// never reach the network.
    pub fn new(configs: &HashMap<PriorityClass, BudgetConfig>) -> Self {
        let now = Instant::now();
        let budgets = PriorityClass::ALL
            .iter()
            .map(|priority| {
                let config = configs.get(priority).copied().unwrap_or(BudgetConfig {
                    capacity: 0,
                    window: Duration::from_secs(60),
                });
                (*priority, Mutex::new(Budget::new(config, now)))
            })
            .collect();
        Self { budgets }
    }

    fn lock(&self, priority: PriorityClass) -> Option<MutexGuard<'_, Budget>> {
        self.budgets.get(&priority).map(|budget| {
            budget.lock().unwrap_or_else(|poisoned| {
                warn!("Rate budget mutex was poisoned, recovering");
                poisoned.into_inner()
            })
        })
    }

    /// Consume one request from the class budget.
    ///
    /// Returns false when the budget for the current window is exhausted.
    pub fn try_consume(&self, priority: PriorityClass) -> bool {
        self.try_consume_at(priority, Instant::now())
    }

    pub(crate) fn try_consume_at(&self, priority: PriorityClass, now: Instant) -> bool {
        let Some(mut budget) = self.lock(priority) else {
            return false;
        };
        let allowed = budget.try_consume(now);
        if !allowed {
            debug!(
                "Rate budget: {} exhausted ({}/{} in window)",
                priority, budget.consumed, budget.capacity
            );
        }
        allowed
    }

    /// Requests left in the current window for a class.
    pub fn remaining(&self, priority: PriorityClass) -> u32 {
        self.lock(priority)
            .map(|budget| budget.remaining(Instant::now()))
            .unwrap_or(0)
    }

    /// Status for all classes, in [`PriorityClass::ALL`] order.
    pub fn snapshot(&self) -> Vec<BudgetStatus> {
        let now = Instant::now();
        PriorityClass::ALL
            .iter()
            .filter_map(|priority| {
                self.lock(*priority).map(|budget| {
                    let elapsed = now.duration_since(budget.window_start);
                    BudgetStatus {
                        priority: *priority,
                        capacity: budget.capacity,
                        remaining: budget.remaining(now),
                        resets_in: budget.window.saturating_sub(elapsed),
                    }
                })
            })
            .collect()
    }
}
