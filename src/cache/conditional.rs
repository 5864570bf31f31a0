use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::EntityKind;

/// Validator and payload from the last successful fetch of one endpoint.
/// Replaced atomically as a whole; readers never see a new validator
/// paired with an old payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub validator: String,
    pub payload: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ConditionalCache {
    entries: Mutex<HashMap<EntityKind, CacheEntry>>,
}

impl ConditionalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }

    /// Just the stored validator, for building conditional requests.
    pub fn validator(&self, kind: EntityKind) -> Option<String> {
        self.get(kind).map(|entry| entry.validator)
    }

    /// Store the response for a cacheable endpoint. Non-cacheable kinds
    /// are dropped with a log line rather than silently polluting the map.
    pub fn put(&self, kind: EntityKind, validator: String, payload: Vec<u8>) {
        if !kind.is_cacheable() {
            debug!(kind = %kind, "Refusing to cache non-cacheable endpoint");
            return;
        }
        let entry = CacheEntry {
            validator,
            payload,
            fetched_at: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, entry);
    }

    pub fn invalidate(&self, kind: EntityKind) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&kind);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
