use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    /// Team abbreviation, e.g. "GEE"
    pub team: String,
    /// Position code, e.g. "MID", "FWD"
    pub position: String,
    /// Salary-cap price in whole dollars
    pub price: i64,
    #[serde(rename = "breakEven")]
    pub break_even: i64,
    #[serde(rename = "averagePoints")]
    pub average_points: f64,
    #[serde(rename = "lastScore", default)]
    pub last_score: Option<i64>,
    #[serde(rename = "selectedByPct", default)]
    pub selected_by_pct: Option<f64>,
    /// Availability status from the API, e.g. "available", "injured"
    #[serde(default)]
    pub status: Option<String>,
}

impl Player {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Price formatted with a thousands separator, e.g. "$512,300"
    pub fn price_display(&self) -> String {
        let mut s = String::new();
        let digits = self.price.abs().to_string();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                s.push(',');
            }
            s.push(c);
        }
        if self.price < 0 {
            format!("-${}", s)
        } else {
            format!("${}", s)
        }
    }

    /// A player projected to beat their break-even is still generating cash.
    pub fn beats_break_even(&self) -> bool {
        self.average_points >= self.break_even as f64
    }
}

impl Entity for Player {
    const KIND: EntityKind = EntityKind::Players;

    fn id(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Player {
        Player {
            id: 1001,
            first_name: "Max".to_string(),
            last_name: "Holmes".to_string(),
            team: "GEE".to_string(),
            position: "MID".to_string(),
            price: 512_300,
            break_even: 82,
            average_points: 96.4,
            last_score: Some(104),
            selected_by_pct: Some(31.2),
            status: None,
        }
    }

    #[test]
    fn test_full_name() {
        assert_eq!(sample().full_name(), "Max Holmes");
    }

    #[test]
    fn test_price_display() {
        assert_eq!(sample().price_display(), "$512,300");

        let mut cheap = sample();
        cheap.price = 123;
        assert_eq!(cheap.price_display(), "$123");

        let mut rookie = sample();
        rookie.price = 1_000;
        assert_eq!(rookie.price_display(), "$1,000");
    }

    #[test]
    fn test_beats_break_even() {
        assert!(sample().beats_break_even());

        let mut fading = sample();
        fading.break_even = 120;
        assert!(!fading.beats_break_even());
    }

    #[test]
    fn test_parses_api_payload() {
        let json = r#"{
            "id": 7,
            "firstName": "Sam",
            "lastName": "Walsh",
            "team": "CAR",
            "position": "MID",
            "price": 689100,
            "breakEven": 101,
            "averagePoints": 108.7,
            "lastScore": 121
        }"#;
        let player: Player = serde_json::from_str(json).expect("valid player JSON");
        assert_eq!(player.id, 7);
        assert_eq!(player.break_even, 101);
        assert_eq!(player.selected_by_pct, None);
    }
}
