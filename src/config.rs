//! Sync configuration management.
//!
//! TTLs, storage budgets, and retry tuning all live here rather than being
//! hard-coded next to the code that uses them, so product can retune
//! freshness per entity kind without touching the sync core.
//!
//! Configuration is stored at `~/.config/draftcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "draftcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the stats API.
    pub api_base_url: String,

    /// Roster data moves with every price change; 10 minutes keeps prices
    /// current without hammering the API.
    pub player_ttl_minutes: i64,
    /// Fixtures only change on reschedules.
    pub fixture_ttl_minutes: i64,
    /// Defensive ratings are recomputed once per round; effectively static.
    pub team_rating_ttl_minutes: i64,
    /// Live scores go stale in seconds; 1 minute is the floor the per-kind
    /// TTL model supports.
    pub live_score_ttl_minutes: i64,

    /// Per-kind record ceilings. Oldest-by-write records are evicted first
    /// once a ceiling is exceeded.
    pub player_ceiling: u64,
    pub fixture_ceiling: u64,
    pub team_rating_ceiling: u64,
    pub live_score_ceiling: u64,

    /// Total serialized-payload budget across all kinds.
    pub storage_budget_bytes: u64,

    /// Consecutive fetch failures before a key is marked degraded.
    pub max_fetch_failures: u32,
    /// First retry delay; doubles per consecutive failure.
    pub backoff_base_ms: u64,
    /// Retry delay cap.
    pub backoff_cap_ms: u64,

    /// Interval between reachability probes.
    pub health_probe_secs: u64,
    /// Interval between janitor passes.
    pub janitor_interval_secs: u64,
    /// Expired records survive this long past expiry so a slow-but-live
    /// refresh isn't undercut by eviction.
    pub purge_grace_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.draftstats.io".to_string(),
            player_ttl_minutes: 10,
            fixture_ttl_minutes: 60,
            team_rating_ttl_minutes: 24 * 60,
            live_score_ttl_minutes: 1,
            player_ceiling: 800,
            fixture_ceiling: 400,
            team_rating_ceiling: 72,
            live_score_ceiling: 800,
            storage_budget_bytes: 8 * 1024 * 1024,
            max_fetch_failures: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            health_probe_secs: 60,
            janitor_interval_secs: 300,
            purge_grace_secs: 120,
        }
    }
}

impl SyncConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("offline.db"))
    }

    /// TTL for one entity kind. Per kind, never per record.
    pub fn ttl(&self, kind: EntityKind) -> Duration {
        let minutes = match kind {
            EntityKind::Players => self.player_ttl_minutes,
            EntityKind::Fixtures => self.fixture_ttl_minutes,
            EntityKind::TeamRatings => self.team_rating_ttl_minutes,
            EntityKind::LiveScores => self.live_score_ttl_minutes,
        };
        Duration::minutes(minutes)
    }

    /// Record ceiling for one entity kind.
    pub fn ceiling(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Players => self.player_ceiling,
            EntityKind::Fixtures => self.fixture_ceiling,
            EntityKind::TeamRatings => self.team_rating_ceiling,
            EntityKind::LiveScores => self.live_score_ceiling,
        }
    }

    pub fn purge_grace(&self) -> Duration {
        Duration::seconds(self.purge_grace_secs)
    }
}
