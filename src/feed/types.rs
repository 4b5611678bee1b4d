use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized internal types used by the engine (vendor-agnostic).

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Settlement outcome categories a wager can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Side,
    Corner,
    Foul,
    Goal,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [Outcome::Side, Outcome::Corner, Outcome::Foul, Outcome::Goal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Side => "side",
            Outcome::Corner => "corner",
            Outcome::Foul => "foul",
            Outcome::Goal => "goal",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGame {
    pub id: String,
    pub side: Option<Side>,
    pub home_name: String,
    pub away_name: String,
}

impl ActiveGame {
    pub fn display_name(&self) -> String {
        format!("{} vs {}", self.home_name, self.away_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub game_id: String,
    pub market_id: String,
    #[serde(rename = "originalType")]
    pub vendor_type: String,
    pub mapped_type: Option<Outcome>,
    pub event_name: String,
    pub timestamp: String,
    pub match_time: Option<u32>,
    pub match_clock: Option<String>,
    pub competitor: Option<String>,
    pub period: Option<u32>,
    pub period_type: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub status: Option<String>,
    pub match_status: Option<String>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

/// A raw live-feed payload tagged with the subscription it arrived on.
#[derive(Debug, Clone)]
pub struct FeedEnvelope {
    pub game_id: String,
    pub market_id: String,
    pub payload: String,
}

/// Vendor live-feed message: `{ "event": {...}, "sport_event_status": {...} }`.
#[derive(Debug, Deserialize)]
pub struct VendorMessage {
    pub event: Option<VendorEvent>,
    #[serde(default)]
    pub sport_event_status: Option<VendorEventStatus>,
}

#[derive(Debug, Deserialize)]
pub struct VendorEvent {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub time: Option<String>,
    pub match_time: Option<u32>,
    pub match_clock: Option<String>,
    pub competitor: Option<String>,
    pub period: Option<u32>,
    pub period_type: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct VendorEventStatus {
    pub status: Option<String>,
    pub match_status: Option<String>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}
