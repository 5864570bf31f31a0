use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub round: u32,
    #[serde(rename = "homeTeam")]
    pub home_team: String,
    #[serde(rename = "awayTeam")]
    pub away_team: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
}

impl Fixture {
    /// Short label for lists, e.g. "R5 GEE v COL"
    pub fn label(&self) -> String {
        format!("R{} {} v {}", self.round, self.home_team, self.away_team)
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn has_started(&self) -> bool {
        Utc::now() >= self.start_time
    }
}

impl Entity for Fixture {
    const KIND: EntityKind = EntityKind::Fixtures;

    fn id(&self) -> i64 {
        self.id
    }
}
