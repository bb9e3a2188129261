mod quote_cache;

pub use quote_cache::QuoteCache;
