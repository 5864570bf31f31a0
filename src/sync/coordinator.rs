//! Fetch-vs-serve-cached orchestration.
//!
//! `SyncCoordinator` owns the per-key state machine and is the only
//! component that writes to the conditional cache and the offline store.
//! Reads always answer with the best available cached value; errors reach
//! callers as soft signals, and only an empty cache surfaces a hard error.
//!
//! All dependencies are injected at construction - no process-wide
//! globals, so tests run against a fake transport and an in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{
    decode_json, Decoded, FetchOutcome, FetchRequest, Transport, TransportError,
};
use crate::cache::ConditionalCache;
use crate::config::SyncConfig;
use crate::models::{Entity, EntityKind, Fixture, LiveScore, Player, TeamRating};
use crate::store::{NewRecord, OfflineStore, StoreError, StoredRecord};

use super::health::{HealthMonitor, HealthState};
use super::janitor::{CacheJanitor, JanitorReport};
use super::state::{backoff_with_jitter, FetchAttempt, KeyState};

/// Capacity of the data-changed broadcast channel.
/// 64 events of lag means a consumer stopped reading long ago.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the per-flight result channel. One result is ever sent.
const INFLIGHT_CHANNEL_CAPACITY: usize = 4;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Host unreachable, serving cache until the next successful probe")]
    Offline,

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error ({status})")]
    Upstream { status: u16 },

    #[error("Malformed response for {kind}: {reason}")]
    Malformed { kind: EntityKind, reason: String },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("No cached data for {kind}")]
    NoData { kind: EntityKind },

    #[error("{kind} is degraded until the next forced refresh")]
    Degraded { kind: EntityKind },

    #[error("Fetch cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Upstream { .. })
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => SyncError::Network(msg),
            TransportError::Unauthorized => SyncError::Unauthorized,
            TransportError::ClientError { status, body } => SyncError::Rejected {
                status,
                message: body,
            },
            TransportError::ServerError { status, .. } => SyncError::Upstream { status },
            TransportError::Unexpected { status, body } => SyncError::Rejected {
                status,
                message: body,
            },
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

/// How trustworthy the records in a `ReadResult` are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Past TTL; a background refresh has been triggered.
    Stale,
    /// Repeated fetch failures; data is the last known good value.
    Degraded,
}

/// Snapshot answer to a read, with enough metadata for a staleness
/// indicator.
#[derive(Debug, Clone)]
pub struct ReadResult<T> {
    pub records: Vec<StoredRecord<T>>,
    pub freshness: Freshness,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> ReadResult<T> {
    /// Human age of the data, e.g. "just now", "5m ago", "2h ago".
    pub fn age_display(&self) -> String {
        let Some(last_updated) = self.last_updated else {
            return "never".to_string();
        };
        let minutes = (Utc::now() - last_updated).num_minutes();
        if minutes < 1 {
            // Covers clock skew too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Emitted once per committed store change. Consumers re-read via
/// `read` for the actual snapshot; 304s emit nothing.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub records: usize,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub kind: EntityKind,
    /// False when the server answered 304 or the key was already fresh.
    pub updated: bool,
    pub records: usize,
}

/// Per-key coordination state. Ephemeral; rebuilt from nothing after a
/// restart.
struct KeyEntry {
    state: KeyState,
    attempt: Option<FetchAttempt>,
    /// Set on non-retryable failures; only a forced refresh clears it.
    sticky: bool,
    /// A 304 re-arms freshness from this instant without touching rows.
    revalidated_at: Option<DateTime<Utc>>,
    inflight: Option<broadcast::Sender<Result<SyncOutcome, SyncError>>>,
    next_seq: u64,
    last_committed_seq: u64,
}

impl Default for KeyEntry {
    fn default() -> Self {
        Self {
            state: KeyState::Stale,
            attempt: None,
            sticky: false,
            revalidated_at: None,
            inflight: None,
            next_seq: 0,
            last_committed_seq: 0,
        }
    }
}

pub struct SyncCoordinator<T: Transport> {
    transport: Arc<T>,
    store: Arc<OfflineStore>,
    conditional: ConditionalCache,
    config: SyncConfig,
    health: HealthMonitor,
    keys: Mutex<HashMap<EntityKind, KeyEntry>>,
    changes: broadcast::Sender<ChangeEvent>,
    shutdown: watch::Sender<bool>,
}

impl<T: Transport> SyncCoordinator<T> {
    pub fn new(transport: Arc<T>, store: Arc<OfflineStore>, config: SyncConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            store,
            conditional: ConditionalCache::new(),
            config,
            health: HealthMonitor::new(),
            keys: Mutex::new(HashMap::new()),
            changes,
            shutdown,
        }
    }

    /// Stream of data-changed events for the presentation layer.
    pub fn observe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    pub fn health(&self) -> HealthState {
        self.health.snapshot()
    }

    pub async fn key_state(&self, kind: EntityKind) -> KeyState {
        let keys = self.keys.lock().await;
        keys.get(&kind).map(|entry| entry.state).unwrap_or(KeyState::Stale)
    }

    /// Cancel in-flight fetches and stop background loops. Cancellation
    /// happens before commit, so no partial writes are possible.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Explicit user command: drop everything durable and volatile.
    pub async fn clear_cache(&self) -> Result<(), SyncError> {
        self.store.clear(None)?;
        self.conditional.clear();
        self.keys.lock().await.clear();
        info!("Cache cleared");
        Ok(())
    }

    /// Serve a collection, cache-first.
    ///
    /// Fresh data returns immediately with no network. Stale data is
    /// served as-is while a background refresh runs. Only a completely
    /// empty collection blocks on the fetch - and only then can a hard
    /// error surface.
    pub async fn read<E: Entity>(self: &Arc<Self>) -> Result<ReadResult<E>, SyncError> {
        let kind = E::KIND;
        let records = self.store.query::<E>()?;
        let last_updated = self.store.last_updated(kind)?;

        if self.is_effectively_fresh(kind).await? {
            return Ok(ReadResult {
                records,
                freshness: Freshness::Fresh,
                last_updated,
            });
        }

        if records.is_empty() {
            self.refresh(kind, false).await.map_err(|e| match e {
                SyncError::Offline | SyncError::Degraded { .. } => SyncError::NoData { kind },
                other => other,
            })?;
            let records = self.store.query::<E>()?;
            let last_updated = self.store.last_updated(kind)?;
            return Ok(ReadResult {
                records,
                freshness: Freshness::Fresh,
                last_updated,
            });
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.refresh(kind, false).await {
                debug!(kind = %kind, error = %e, "Background refresh failed, cache keeps serving");
            }
        });

        let freshness = if self.is_degraded(kind).await {
            Freshness::Degraded
        } else {
            Freshness::Stale
        };
        Ok(ReadResult {
            records,
            freshness,
            last_updated,
        })
    }

    /// Refresh one collection from the network.
    ///
    /// `force` is the user's pull-to-refresh: it bypasses the freshness
    /// short-circuit, the health gate, and any degraded mark - but still
    /// coalesces onto an existing in-flight fetch for the key.
    ///
    /// The flight itself runs as a detached task; dropping this future at
    /// an await point (timeout, select) abandons the wait, not the fetch,
    /// and can never leave the key wedged mid-flight.
    pub async fn refresh(
        self: &Arc<Self>,
        kind: EntityKind,
        force: bool,
    ) -> Result<SyncOutcome, SyncError> {
        if !force && self.is_effectively_fresh(kind).await? {
            return Ok(SyncOutcome {
                kind,
                updated: false,
                records: self.store.count(kind)? as usize,
            });
        }

        enum Action {
            Join(broadcast::Receiver<Result<SyncOutcome, SyncError>>),
            Run {
                seq: u64,
                rx: broadcast::Receiver<Result<SyncOutcome, SyncError>>,
            },
        }

        let action = {
            let mut keys = self.keys.lock().await;
            let entry = keys.entry(kind).or_default();

            if let Some(tx) = &entry.inflight {
                Action::Join(tx.subscribe())
            } else {
                if force {
                    entry.attempt = None;
                    entry.sticky = false;
                } else {
                    if entry.sticky {
                        return Err(SyncError::Degraded { kind });
                    }
                    if let Some(attempt) = &entry.attempt {
                        if Utc::now() < attempt.next_retry_at {
                            return Err(SyncError::Degraded { kind });
                        }
                    }
                    if !self.health.is_reachable() {
                        return Err(SyncError::Offline);
                    }
                }
                let (tx, rx) = broadcast::channel(INFLIGHT_CHANNEL_CAPACITY);
                entry.inflight = Some(tx);
                entry.state = KeyState::Fetching;
                entry.next_seq += 1;
                Action::Run {
                    seq: entry.next_seq,
                    rx,
                }
            }
        };

        match action {
            Action::Join(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Cancelled),
            },
            Action::Run { seq, mut rx } => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let result = this.execute_fetch(kind, seq).await;
                    this.finalize(kind, &result).await;
                });
                match rx.recv().await {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Cancelled),
                }
            }
        }
    }

    /// One wire round trip plus the atomic commit.
    async fn execute_fetch(&self, kind: EntityKind, seq: u64) -> Result<SyncOutcome, SyncError> {
        let validator = if kind.is_cacheable() {
            self.conditional.validator(kind)
        } else {
            None
        };
        let request = FetchRequest::get(kind, validator);

        let mut shutdown = self.shutdown.subscribe();
        let outcome = tokio::select! {
            _ = shutdown.changed() => return Err(SyncError::Cancelled),
            // A single failed fetch is not unreachability evidence; only
            // the probe marks the host down, any success marks it up.
            result = self.transport.fetch(request) => result?,
        };
        self.health.record_success();

        match outcome {
            FetchOutcome::NotModified => {
                debug!(kind = %kind, "Not modified, cache confirmed current");
                Ok(SyncOutcome {
                    kind,
                    updated: false,
                    records: self.store.count(kind)? as usize,
                })
            }
            FetchOutcome::Ok { validator, body } => {
                let rows = match Self::decode_for_kind(kind, &body) {
                    Decoded::Parsed(rows) => rows,
                    Decoded::Malformed { reason } => {
                        warn!(kind = %kind, reason = %reason,
                              "Malformed payload, keeping previous cache");
                        return Err(SyncError::Malformed { kind, reason });
                    }
                };

                // Commit is all-or-nothing under the kind's write lock;
                // the validator and payload always move together.
                let type_lock = self.store.type_lock(kind);
                let _guard = type_lock.lock().await;

                // Only the newest flight's response may commit.
                {
                    let keys = self.keys.lock().await;
                    if let Some(entry) = keys.get(&kind) {
                        if entry.last_committed_seq >= seq {
                            debug!(kind = %kind, seq, "Discarding superseded response");
                            return Ok(SyncOutcome {
                                kind,
                                updated: false,
                                records: rows.len(),
                            });
                        }
                    }
                }

                let count = rows.len();
                self.store.upsert_many(kind, &rows)?;
                match validator {
                    Some(validator) if kind.is_cacheable() => {
                        self.conditional.put(kind, validator, body);
                    }
                    _ => self.conditional.invalidate(kind),
                }
                {
                    let mut keys = self.keys.lock().await;
                    let entry = keys.entry(kind).or_default();
                    entry.last_committed_seq = seq;
                    entry.revalidated_at = None;
                }

                let _ = self.changes.send(ChangeEvent {
                    kind,
                    records: count,
                    at: Utc::now(),
                });
                info!(kind = %kind, records = count, "Committed refresh");
                Ok(SyncOutcome {
                    kind,
                    updated: true,
                    records: count,
                })
            }
        }
    }

    /// Record the flight's outcome in the state machine and wake waiters.
    async fn finalize(&self, kind: EntityKind, result: &Result<SyncOutcome, SyncError>) {
        let sender = {
            let mut keys = self.keys.lock().await;
            let entry = keys.entry(kind).or_default();

            match result {
                Ok(outcome) => {
                    entry.attempt = None;
                    entry.sticky = false;
                    entry.state = KeyState::Fresh;
                    if !outcome.updated {
                        entry.revalidated_at = Some(Utc::now());
                    }
                }
                Err(SyncError::Cancelled) => {
                    entry.state = KeyState::Stale;
                }
                Err(e) if e.is_retryable() => {
                    let failures = entry.attempt.as_ref().map(|a| a.failures).unwrap_or(0) + 1;
                    let delay = backoff_with_jitter(
                        failures,
                        self.config.backoff_base_ms,
                        self.config.backoff_cap_ms,
                    );
                    entry.attempt = Some(FetchAttempt {
                        failures,
                        next_retry_at: Utc::now() + Duration::milliseconds(delay.as_millis() as i64),
                    });
                    if failures > self.config.max_fetch_failures {
                        entry.sticky = true;
                        entry.state = KeyState::Degraded;
                    } else if failures >= self.config.max_fetch_failures {
                        entry.state = KeyState::Degraded;
                    } else {
                        entry.state = KeyState::Stale;
                    }
                    warn!(kind = %kind, failures, delay_ms = delay.as_millis() as u64,
                          "Fetch failed, backing off");
                }
                Err(_) => {
                    // Non-retryable: decode failure or a 4xx that needs
                    // user action. No automatic retries.
                    entry.sticky = true;
                    entry.state = KeyState::Degraded;
                }
            }
            entry.inflight.take()
        };

        if let Some(tx) = sender {
            let _ = tx.send(result.clone());
        }
    }

    /// Store-level freshness, or a recent 304 revalidation.
    async fn is_effectively_fresh(&self, kind: EntityKind) -> Result<bool, SyncError> {
        if self.store.is_fresh(kind)? {
            return Ok(true);
        }
        let keys = self.keys.lock().await;
        if let Some(entry) = keys.get(&kind) {
            if let Some(revalidated_at) = entry.revalidated_at {
                return Ok(Utc::now() < revalidated_at + self.config.ttl(kind));
            }
        }
        Ok(false)
    }

    async fn is_degraded(&self, kind: EntityKind) -> bool {
        let keys = self.keys.lock().await;
        keys.get(&kind)
            .map(|entry| entry.sticky || entry.state == KeyState::Degraded)
            .unwrap_or(false)
    }

    fn decode_for_kind(kind: EntityKind, body: &[u8]) -> Decoded<Vec<NewRecord>> {
        match kind {
            EntityKind::Players => Self::decode_rows::<Player>(body),
            EntityKind::Fixtures => Self::decode_rows::<Fixture>(body),
            EntityKind::TeamRatings => Self::decode_rows::<TeamRating>(body),
            EntityKind::LiveScores => Self::decode_rows::<LiveScore>(body),
        }
    }

    /// Strictly-typed decode: the whole payload parses or none of it is
    /// used. Re-serializing validated entities is what lands in the store.
    fn decode_rows<E: Entity>(body: &[u8]) -> Decoded<Vec<NewRecord>> {
        match decode_json::<Vec<E>>(body) {
            Decoded::Parsed(entities) => {
                let mut rows = Vec::with_capacity(entities.len());
                for entity in &entities {
                    match NewRecord::from_entity(entity) {
                        Ok(row) => rows.push(row),
                        Err(e) => {
                            return Decoded::Malformed {
                                reason: e.to_string(),
                            }
                        }
                    }
                }
                Decoded::Parsed(rows)
            }
            Decoded::Malformed { reason } => Decoded::Malformed { reason },
        }
    }

    // ========================================================================
    // Background loops
    // ========================================================================

    /// Spawn the health probe and janitor loops. Both stop on `shutdown`.
    pub fn start_background_tasks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Self::run_health_loop(Arc::clone(self))),
            tokio::spawn(Self::run_janitor_loop(Arc::clone(self))),
        ]
    }

    async fn run_health_loop(this: Arc<Self>) {
        let mut shutdown = this.shutdown.subscribe();
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(this.config.health_probe_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reachable = this.health.probe(&*this.transport).await;
                    if reachable {
                        this.kick_stale_refreshes().await;
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Health loop stopped");
                    return;
                }
            }
        }
    }

    /// Periodic tick half of the `Stale -> Fetching` transition: nudge
    /// every stale key. The per-key gates decide whether a fetch actually
    /// happens.
    async fn kick_stale_refreshes(self: &Arc<Self>) {
        for kind in EntityKind::ALL {
            let fresh = match self.is_effectively_fresh(kind).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Freshness check failed");
                    continue;
                }
            };
            if fresh {
                continue;
            }
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.refresh(kind, false).await {
                    debug!(kind = %kind, error = %e, "Periodic refresh skipped");
                }
            });
        }
    }

    async fn run_janitor_loop(this: Arc<Self>) {
        let mut shutdown = this.shutdown.subscribe();
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            this.config.janitor_interval_secs,
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = this.run_janitor_pass().await {
                        warn!(error = %e, "Janitor pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Janitor loop stopped");
                    return;
                }
            }
        }
    }

    /// One janitor pass plus reconciliation: a kind that lost rows also
    /// loses its stored validator and revalidation mark. Without that, a
    /// fetch after the purge could answer 304 against rows that no longer
    /// exist and the collection could never repopulate.
    pub async fn run_janitor_pass(&self) -> Result<JanitorReport, SyncError> {
        let janitor = CacheJanitor::new(Arc::clone(&self.store), self.config.clone());
        let report = janitor.run_once().await?;
        if !report.touched_kinds.is_empty() {
            let mut keys = self.keys.lock().await;
            for kind in &report.touched_kinds {
                self.conditional.invalidate(*kind);
                if let Some(entry) = keys.get_mut(kind) {
                    entry.revalidated_at = None;
                }
            }
        }
        Ok(report)
    }

    /// Host memory/storage-pressure signal: run the janitor immediately.
    pub async fn on_memory_pressure(&self) -> Result<(), SyncError> {
        info!("Memory pressure signal, running janitor pass");
        self.run_janitor_pass().await?;
        Ok(())
    }
}
