//! Market data models
//!
//! This module contains the core data types for quote acquisition:
//! - `priority` - Caller priority classes and source trust tiers
//! - `quote` - Quote data structures (Quote, AcquiredQuote, QuoteOrigin)

mod priority;
mod quote;

pub use priority::{PriorityClass, SourceTier};
pub use quote::{AcquiredQuote, Quote, QuoteOrigin};
