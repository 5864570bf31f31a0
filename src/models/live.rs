use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// In-game scoring snapshot for one player. Volatile: the collection
/// carries a very short TTL and is excluded from validator caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveScore {
    /// Matches the player's roster id.
    pub id: i64,
    pub points: i64,
    #[serde(rename = "timeOnGroundPct", default)]
    pub time_on_ground_pct: Option<f64>,
    /// Quarter the match is in, 1-4; absent before the bounce.
    #[serde(default)]
    pub quarter: Option<u8>,
}

impl LiveScore {
    pub fn is_playing(&self) -> bool {
        self.quarter.is_some()
    }
}

impl Entity for LiveScore {
    const KIND: EntityKind = EntityKind::LiveScores;

    fn id(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_playing() {
        let bench = LiveScore {
            id: 1,
            points: 0,
            time_on_ground_pct: None,
            quarter: None,
        };
        assert!(!bench.is_playing());

        let on_field = LiveScore {
            quarter: Some(2),
            ..bench
        };
        assert!(on_field.is_playing());
    }
}
