//! Fetch orchestration: the sync coordinator, health probe, and janitor.
//!
//! The coordinator decides fetch-vs-serve-cached per entity kind, runs a
//! per-key state machine (`Fresh -> Stale -> Fetching -> Degraded`), and
//! guarantees at most one in-flight request per key. The health monitor
//! and janitor run on timers and never block the read path.

pub mod coordinator;
pub mod health;
pub mod janitor;
pub mod state;

pub use coordinator::{
    ChangeEvent, Freshness, ReadResult, SyncCoordinator, SyncError, SyncOutcome,
};
pub use health::{HealthMonitor, HealthState};
pub use janitor::{CacheJanitor, JanitorReport};
pub use state::KeyState;
