//! SQLite-backed offline store with TTL expiry and bounded storage.
//!
//! Records are written in bulk inside a transaction so readers see either
//! the old collection or the fully-updated one, never a half-written mix.
//! Expiry is derived per entity kind (`last_updated + ttl(kind)`), and
//! eviction is oldest-by-write first - read access is deliberately not
//! tracked to avoid write amplification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::models::{Entity, EntityKind};

/// Timestamp storage format. Fixed-width so lexicographic ordering in SQL
/// matches chronological ordering.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current schema version, tracked in `PRAGMA user_version`.
/// Migrations are additive only (new columns, new indexes) so an app
/// upgrade never invalidates the cached rows.
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    entity_type TEXT NOT NULL,
    id INTEGER NOT NULL,
    payload BLOB NOT NULL,
    last_updated TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    PRIMARY KEY (entity_type, id)
);

CREATE INDEX IF NOT EXISTS idx_records_write_order
    ON records(entity_type, last_updated);

CREATE INDEX IF NOT EXISTS idx_records_expiry
    ON records(expires_at);
"#;

/// How many rows one budget-eviction pass deletes at a time.
const EVICTION_BATCH: u64 = 32;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store location unavailable: {0}")]
    Location(String),

    #[error("Corrupt timestamp in store: {0}")]
    BadTimestamp(String),
}

/// A record heading into the store: validated payload plus its id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: i64,
    pub payload: serde_json::Value,
}

impl NewRecord {
    pub fn from_entity<T: Entity>(entity: &T) -> Result<Self, StoreError> {
        Ok(Self {
            id: entity.id(),
            payload: serde_json::to_value(entity)?,
        })
    }
}

/// A record read back out, with the timestamps callers need to render
/// staleness indicators.
#[derive(Debug, Clone)]
pub struct StoredRecord<T> {
    pub id: i64,
    pub payload: T,
    pub last_updated: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> StoredRecord<T> {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

pub struct OfflineStore {
    conn: Mutex<Connection>,
    config: SyncConfig,
    /// Per-kind mutual exclusion between bulk upserts and janitor passes.
    /// Not a single global lock - unrelated kinds purge concurrently.
    type_locks: Mutex<HashMap<EntityKind, Arc<tokio::sync::Mutex<()>>>>,
}

impl OfflineStore {
    /// Open the store at the configured path. If the database cannot be
    /// opened (I/O failure, corrupt file) the store falls back to an
    /// in-memory database for the session rather than failing the app.
    pub fn open(config: &SyncConfig) -> Result<Self, StoreError> {
        let path = config
            .db_path()
            .map_err(|e| StoreError::Location(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = match Connection::open(&path) {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, path = %path.display(),
                      "Failed to open offline store, falling back to in-memory for this session");
                Connection::open_in_memory()?
            }
        };

        Self::with_connection(conn, config.clone())
    }

    /// In-memory store, used by tests and as the storage-failure fallback.
    pub fn open_in_memory(config: &SyncConfig) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, config.clone())
    }

    fn with_connection(conn: Connection, config: SyncConfig) -> Result<Self, StoreError> {
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            type_locks: Mutex::new(HashMap::new()),
        })
    }

    fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(SCHEMA)?;
        }
        // Future versions: additive ALTER TABLE steps go here, gated on
        // `version < N`, so existing rows survive every upgrade.

        if version > SCHEMA_VERSION {
            warn!(
                found = version,
                supported = SCHEMA_VERSION,
                "Offline store schema is newer than this build"
            );
        } else if version != SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Async lock serializing bulk writes and janitor passes for one kind.
    pub fn type_lock(&self, kind: EntityKind) -> Arc<tokio::sync::Mutex<()>> {
        self.type_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Replace-or-insert a batch of records in one transaction.
    /// All-or-nothing: a failure mid-batch rolls the whole write back.
    pub fn upsert_many(&self, kind: EntityKind, records: &[NewRecord]) -> Result<usize, StoreError> {
        let now = Utc::now();
        let expires = now + self.config.ttl(kind);

        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        for record in records {
            let payload = serde_json::to_vec(&record.payload)?;
            tx.execute(
                "INSERT OR REPLACE INTO records (entity_type, id, payload, last_updated, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kind.as_key(),
                    record.id,
                    payload,
                    fmt_ts(now),
                    fmt_ts(expires)
                ],
            )?;
        }
        tx.commit()?;

        debug!(kind = %kind, count = records.len(), "Upserted records");
        Ok(records.len())
    }

    /// Snapshot of one collection, ordered by id. Rows that fail to
    /// deserialize are skipped with a warning rather than failing the read.
    pub fn query<T: Entity>(&self) -> Result<Vec<StoredRecord<T>>, StoreError> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT id, payload, last_updated, expires_at FROM records
             WHERE entity_type = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![T::KIND.as_key()], |row| {
            let id: i64 = row.get(0)?;
            let payload: Vec<u8> = row.get(1)?;
            let last_updated: String = row.get(2)?;
            let expires_at: String = row.get(3)?;
            Ok((id, payload, last_updated, expires_at))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, payload, last_updated, expires_at) = row?;
            let payload: T = match serde_json::from_slice(&payload) {
                Ok(value) => value,
                Err(e) => {
                    warn!(kind = %T::KIND, id, error = %e, "Skipping undecodable record");
                    continue;
                }
            };
            records.push(StoredRecord {
                id,
                payload,
                last_updated: parse_ts(&last_updated)?,
                expires_at: parse_ts(&expires_at)?,
            });
        }
        Ok(records)
    }

    pub fn count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let conn = self.lock_conn();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity_type = ?1",
            params![kind.as_key()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// True when the collection is non-empty and every record is inside
    /// its TTL. An empty collection is never fresh - a cold start must
    /// always trigger a fetch.
    pub fn is_fresh(&self, kind: EntityKind) -> Result<bool, StoreError> {
        let conn = self.lock_conn();
        let (total, expired): (u64, u64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0)
             FROM records WHERE entity_type = ?2",
            params![fmt_ts(Utc::now()), kind.as_key()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(total > 0 && expired == 0)
    }

    /// Most recent write timestamp for a collection, if any.
    pub fn last_updated(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.lock_conn();
        let latest: Option<String> = conn
            .query_row(
                "SELECT MAX(last_updated) FROM records WHERE entity_type = ?1",
                params![kind.as_key()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        latest.as_deref().map(parse_ts).transpose()
    }

    /// Delete records expired for longer than the grace window.
    /// The grace window keeps a slow-but-successful refresh in progress
    /// from being undercut by eviction.
    pub fn purge_expired(&self, kind: EntityKind, grace: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - grace;
        let conn = self.lock_conn();
        let deleted = conn.execute(
            "DELETE FROM records WHERE entity_type = ?1 AND expires_at < ?2",
            params![kind.as_key(), fmt_ts(cutoff)],
        )?;
        if deleted > 0 {
            debug!(kind = %kind, deleted, "Purged expired records");
        }
        Ok(deleted)
    }

    /// Enforce a per-kind record ceiling, evicting oldest-by-write first.
    pub fn evict_over_ceiling(&self, kind: EntityKind, ceiling: u64) -> Result<usize, StoreError> {
        let count = self.count(kind)?;
        if count <= ceiling {
            return Ok(0);
        }
        let excess = count - ceiling;
        let conn = self.lock_conn();
        let deleted = conn.execute(
            "DELETE FROM records WHERE entity_type = ?1 AND rowid IN (
                 SELECT rowid FROM records WHERE entity_type = ?1
                 ORDER BY last_updated ASC, id ASC LIMIT ?2
             )",
            params![kind.as_key(), excess],
        )?;
        debug!(kind = %kind, deleted, ceiling, "Evicted records over ceiling");
        Ok(deleted)
    }

    /// Total serialized-payload footprint across all kinds.
    pub fn footprint_bytes(&self) -> Result<u64, StoreError> {
        let conn = self.lock_conn();
        let bytes: u64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM records",
            [],
            |row| row.get(0),
        )?;
        Ok(bytes)
    }

    /// Evict least-recently-written records across all kinds until the
    /// footprint fits the budget.
    pub fn evict_to_budget(&self, budget_bytes: u64) -> Result<usize, StoreError> {
        let mut evicted = 0;
        loop {
            if self.footprint_bytes()? <= budget_bytes {
                break;
            }
            let conn = self.lock_conn();
            let deleted = conn.execute(
                "DELETE FROM records WHERE rowid IN (
                     SELECT rowid FROM records
                     ORDER BY last_updated ASC, id ASC LIMIT ?1
                 )",
                params![EVICTION_BATCH],
            )?;
            drop(conn);
            if deleted == 0 {
                break;
            }
            evicted += deleted;
        }
        if evicted > 0 {
            debug!(evicted, budget_bytes, "Evicted records to fit storage budget");
        }
        Ok(evicted)
    }

    /// Drop one collection, or everything on the explicit user
    /// "clear cache" command.
    pub fn clear(&self, kind: Option<EntityKind>) -> Result<usize, StoreError> {
        let conn = self.lock_conn();
        let deleted = match kind {
            Some(kind) => conn.execute(
                "DELETE FROM records WHERE entity_type = ?1",
                params![kind.as_key()],
            )?,
            None => conn.execute("DELETE FROM records", [])?,
        };
        Ok(deleted)
    }

    /// Shift one record's timestamps into the past. Tests use this to
    /// simulate aged data without a clock abstraction.
    #[cfg(test)]
    pub(crate) fn backdate_record(
        &self,
        kind: EntityKind,
        id: i64,
        by: Duration,
    ) -> Result<(), StoreError> {
        let conn = self.lock_conn();
        let (last_updated, expires_at): (String, String) = conn.query_row(
            "SELECT last_updated, expires_at FROM records WHERE entity_type = ?1 AND id = ?2",
            params![kind.as_key(), id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        conn.execute(
            "UPDATE records SET last_updated = ?3, expires_at = ?4
             WHERE entity_type = ?1 AND id = ?2",
            params![
                kind.as_key(),
                id,
                fmt_ts(parse_ts(&last_updated)? - by),
                fmt_ts(parse_ts(&expires_at)? - by),
            ],
        )?;
        Ok(())
    }

    /// Backdate every record of a kind.
    #[cfg(test)]
    pub(crate) fn backdate_all(&self, kind: EntityKind, by: Duration) -> Result<(), StoreError> {
        let ids: Vec<i64> = {
            let conn = self.lock_conn();
            let mut stmt =
                conn.prepare("SELECT id FROM records WHERE entity_type = ?1")?;
            let rows = stmt.query_map(params![kind.as_key()], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        for id in ids {
            self.backdate_record(kind, id, by)?;
        }
        Ok(())
    }
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| StoreError::BadTimestamp(format!("'{}': {}", s, e)))
}
