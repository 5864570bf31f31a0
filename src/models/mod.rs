//! Data models for fantasy-sports entities.
//!
//! This module contains the data structures synced from the stats API:
//!
//! - `Player`: roster entries with pricing and scoring data
//! - `Fixture`: scheduled matches between teams
//! - `TeamRating`: per-position defensive ratings (matchup difficulty)
//! - `LiveScore`: in-game scoring snapshots (volatile, short TTL)
//!
//! `EntityKind` tags each logical collection and doubles as the endpoint
//! key into the conditional cache and the offline store.

pub mod fixture;
pub mod live;
pub mod player;
pub mod team;

pub use fixture::Fixture;
pub use live::LiveScore;
pub use player::Player;
pub use team::{Difficulty, TeamRating};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Logical entity collections served by the stats API.
///
/// Each kind maps to exactly one endpoint key, one TTL, and one storage
/// ceiling. The variants are the complete set of collections this client
/// syncs; write/command endpoints never get a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Players,
    Fixtures,
    TeamRatings,
    LiveScores,
}

impl EntityKind {
    /// All syncable kinds, in refresh order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Players,
        EntityKind::Fixtures,
        EntityKind::TeamRatings,
        EntityKind::LiveScores,
    ];

    /// Stable endpoint key. Unique per logical resource; used as the
    /// primary key into both the conditional cache and the offline store's
    /// freshness index.
    pub fn as_key(&self) -> &'static str {
        match self {
            EntityKind::Players => "players",
            EntityKind::Fixtures => "fixtures",
            EntityKind::TeamRatings => "team-ratings",
            EntityKind::LiveScores => "live-scores",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_key() == key)
    }

    /// Whether responses for this kind may be validator-cached.
    /// Live scores change on every request, so a stored ETag would only
    /// ever produce useless revalidation round-trips.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, EntityKind::LiveScores)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Players => "Players",
            EntityKind::Fixtures => "Fixtures",
            EntityKind::TeamRatings => "Team Ratings",
            EntityKind::LiveScores => "Live Scores",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

/// A domain type that lives in one offline-store collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this type belongs to.
    const KIND: EntityKind;

    /// Stable record id within the collection.
    fn id(&self) -> i64;
}
