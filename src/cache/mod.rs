//! In-memory conditional-fetch cache.
//!
//! Remembers the last successful response per endpoint so a 304 can be
//! served without re-transferring or re-parsing network bytes. Volatile
//! by design - the offline store is the durable layer; this is a pure
//! request-deduplication optimization.

pub mod conditional;

pub use conditional::{CacheEntry, ConditionalCache};
