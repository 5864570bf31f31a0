//! Durable offline store.
//!
//! The single source of truth for synced data: an embedded SQLite
//! database keyed by `(entity_type, id)` with per-record write timestamps
//! and expiry. Everything else in the crate is a cache of this cache and
//! may be dropped freely across restarts.

pub mod offline;

pub use offline::{NewRecord, OfflineStore, StoreError, StoredRecord};
