//! Background eviction and compaction.
//!
//! One component owns all eviction: expiry purge first, then per-kind
//! record ceilings, then a global byte budget. Runs on a timer and on
//! memory-pressure signals from the host; never on the read path.

use std::sync::Arc;

use tracing::debug;

use crate::config::SyncConfig;
use crate::models::EntityKind;
use crate::store::{OfflineStore, StoreError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JanitorReport {
    pub expired_purged: usize,
    pub ceiling_evicted: usize,
    pub budget_evicted: usize,
    pub footprint_bytes: u64,
    /// Kinds that lost rows this pass. The coordinator drops the stored
    /// validator for these, so the next fetch cannot answer 304 against
    /// rows that no longer exist.
    pub touched_kinds: Vec<EntityKind>,
}

pub struct CacheJanitor {
    store: Arc<OfflineStore>,
    config: SyncConfig,
}

impl CacheJanitor {
    pub fn new(store: Arc<OfflineStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// One full pass. Holds each kind's write lock only while working on
    /// that kind, so a bulk upsert for an unrelated kind is never blocked.
    pub async fn run_once(&self) -> Result<JanitorReport, StoreError> {
        let mut report = JanitorReport::default();
        let grace = self.config.purge_grace();

        for kind in EntityKind::ALL {
            let lock = self.store.type_lock(kind);
            let _guard = lock.lock().await;
            let purged = self.store.purge_expired(kind, grace)?;
            let evicted = self
                .store
                .evict_over_ceiling(kind, self.config.ceiling(kind))?;
            report.expired_purged += purged;
            report.ceiling_evicted += evicted;
            if purged + evicted > 0 {
                report.touched_kinds.push(kind);
            }
        }

        // Budget pass deletes across kinds, so take every write lock
        // (in ALL order, same as above - no lock-order inversion).
        let footprint = self.store.footprint_bytes()?;
        if footprint > self.config.storage_budget_bytes {
            let locks: Vec<_> = EntityKind::ALL
                .iter()
                .map(|kind| self.store.type_lock(*kind))
                .collect();
            let mut guards = Vec::with_capacity(locks.len());
            for lock in &locks {
                guards.push(lock.lock().await);
            }
            report.budget_evicted = self
                .store
                .evict_to_budget(self.config.storage_budget_bytes)?;
            if report.budget_evicted > 0 {
                // Budget eviction deletes across kinds without reporting
                // which, so every kind counts as touched.
                report.touched_kinds = EntityKind::ALL.to_vec();
            }
        }

        report.footprint_bytes = self.store.footprint_bytes()?;
        debug!(
            expired = report.expired_purged,
            ceiling = report.ceiling_evicted,
            budget = report.budget_evicted,
            footprint = report.footprint_bytes,
            "Janitor pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewRecord;
    use chrono::Duration;

    fn tight_config() -> SyncConfig {
        SyncConfig {
            fixture_ceiling: 100,
            storage_budget_bytes: 1024 * 1024,
            ..SyncConfig::default()
        }
    }

    fn record(id: i64) -> NewRecord {
        NewRecord {
            id,
            payload: serde_json::json!({ "id": id, "padding": "x".repeat(64) }),
        }
    }

    fn records(range: std::ops::Range<i64>) -> Vec<NewRecord> {
        range.map(record).collect()
    }

    #[tokio::test]
    async fn test_pass_purges_expired_past_grace() {
        let config = tight_config();
        let store = Arc::new(OfflineStore::open_in_memory(&config).expect("store"));
        let janitor = CacheJanitor::new(Arc::clone(&store), config);

        store
            .upsert_many(EntityKind::Players, &records(1..11))
            .expect("upsert");
        // Expired past TTL (10m) plus grace (2m).
        store
            .backdate_all(EntityKind::Players, Duration::minutes(15))
            .expect("backdate");

        let report = janitor.run_once().await.expect("janitor pass");
        assert_eq!(report.expired_purged, 10);
        assert_eq!(report.touched_kinds, vec![EntityKind::Players]);
        assert_eq!(store.count(EntityKind::Players).expect("count"), 0);
    }

    #[tokio::test]
    async fn test_pass_keeps_expired_within_grace() {
        let config = tight_config();
        let store = Arc::new(OfflineStore::open_in_memory(&config).expect("store"));
        let janitor = CacheJanitor::new(Arc::clone(&store), config);

        store
            .upsert_many(EntityKind::Players, &records(1..11))
            .expect("upsert");
        // Just past TTL, still inside the 2-minute grace window.
        store
            .backdate_all(EntityKind::Players, Duration::minutes(11))
            .expect("backdate");

        let report = janitor.run_once().await.expect("janitor pass");
        assert_eq!(report.expired_purged, 0);
        assert!(report.touched_kinds.is_empty());
        assert_eq!(store.count(EntityKind::Players).expect("count"), 10);
    }

    #[tokio::test]
    async fn test_pass_enforces_record_ceiling() {
        let config = tight_config();
        let store = Arc::new(OfflineStore::open_in_memory(&config).expect("store"));
        let janitor = CacheJanitor::new(Arc::clone(&store), config);

        // 150 fixtures against a ceiling of 100; the first 50 are
        // oldest-by-write.
        store
            .upsert_many(EntityKind::Fixtures, &records(1..51))
            .expect("upsert");
        store
            .backdate_all(EntityKind::Fixtures, Duration::minutes(5))
            .expect("backdate");
        store
            .upsert_many(EntityKind::Fixtures, &records(51..151))
            .expect("upsert");

        let report = janitor.run_once().await.expect("janitor pass");
        assert_eq!(report.ceiling_evicted, 50);
        assert_eq!(store.count(EntityKind::Fixtures).expect("count"), 100);
    }

    #[tokio::test]
    async fn test_pass_enforces_byte_budget() {
        let config = SyncConfig {
            storage_budget_bytes: 4_096,
            ..SyncConfig::default()
        };
        let store = Arc::new(OfflineStore::open_in_memory(&config).expect("store"));
        let janitor = CacheJanitor::new(Arc::clone(&store), config);

        store
            .upsert_many(EntityKind::Players, &records(1..201))
            .expect("upsert");
        assert!(store.footprint_bytes().expect("footprint") > 4_096);

        let report = janitor.run_once().await.expect("janitor pass");
        assert!(report.budget_evicted > 0);
        assert!(report.footprint_bytes <= 4_096);
    }
}
