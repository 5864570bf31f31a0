use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

/// Points a team concedes to opponents in one position — the "defense
/// versus position" rating used for matchup difficulty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRating {
    pub id: i64,
    /// Team abbreviation, e.g. "COL"
    pub team: String,
    /// Position the rating applies to, e.g. "MID"
    pub position: String,
    #[serde(rename = "pointsConcededAvg")]
    pub points_conceded_avg: f64,
    /// League-wide rank: 1 concedes the fewest points (hardest matchup).
    pub rank: u32,
}

/// Difficulty band derived from a rating's league rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Neutral,
    Hard,
}

/// Rank at or below which a matchup counts as hard.
const HARD_RANK_CUTOFF: u32 = 6;

/// Rank at or above which a matchup counts as easy (18-team league).
const EASY_RANK_CUTOFF: u32 = 13;

impl TeamRating {
    pub fn difficulty(&self) -> Difficulty {
        if self.rank <= HARD_RANK_CUTOFF {
            Difficulty::Hard
        } else if self.rank >= EASY_RANK_CUTOFF {
            Difficulty::Easy
        } else {
            Difficulty::Neutral
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Neutral => write!(f, "Neutral"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl Entity for TeamRating {
    const KIND: EntityKind = EntityKind::TeamRatings;

    fn id(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(rank: u32) -> TeamRating {
        TeamRating {
            id: rank as i64,
            team: "COL".to_string(),
            position: "MID".to_string(),
            points_conceded_avg: 98.5,
            rank,
        }
    }

    #[test]
    fn test_difficulty_bands() {
        assert_eq!(rating(1).difficulty(), Difficulty::Hard);
        assert_eq!(rating(6).difficulty(), Difficulty::Hard);
        assert_eq!(rating(7).difficulty(), Difficulty::Neutral);
        assert_eq!(rating(12).difficulty(), Difficulty::Neutral);
        assert_eq!(rating(13).difficulty(), Difficulty::Easy);
        assert_eq!(rating(18).difficulty(), Difficulty::Easy);
    }
}
