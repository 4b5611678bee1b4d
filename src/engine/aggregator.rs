//! Deterministic reduction of a market's buffered events into its result.

use crate::feed::types::{ActiveGame, NormalizedEvent, Outcome, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResult {
    pub total_events: usize,
    pub events_by_side: EventsBySide,
    pub summary: BTreeMap<Outcome, SideCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsBySide {
    #[serde(rename = "A")]
    pub a: SideEvents,
    #[serde(rename = "B")]
    pub b: SideEvents,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideEvents {
    pub game_id: Option<String>,
    pub game_name: Option<String>,
    pub events: Vec<SettledEvent>,
}

/// Projection of a normalized event kept in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledEvent {
    #[serde(rename = "type")]
    pub outcome: Outcome,
    pub original_type: String,
    pub event_name: String,
    pub timestamp: String,
    pub match_time: Option<u32>,
    pub competitor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounts {
    #[serde(rename = "A")]
    pub a: u32,
    #[serde(rename = "B")]
    pub b: u32,
}

impl SideCounts {
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    fn increment(&mut self, side: Side) {
        match side {
            Side::A => self.a += 1,
            Side::B => self.b += 1,
        }
    }
}

/// A settled event with the side and game it was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedEvent {
    pub side: Side,
    pub game_id: Option<String>,
    pub event: SettledEvent,
}

impl MarketResult {
    /// Result for a market that produced no usable inputs.
    pub fn empty() -> Self {
        build_market_results(&[], &[])
    }

    pub fn side(&self, side: Side) -> &SideEvents {
        match side {
            Side::A => &self.events_by_side.a,
            Side::B => &self.events_by_side.b,
        }
    }

    pub fn count(&self, outcome: Outcome, side: Side) -> u32 {
        self.summary.get(&outcome).map(|c| c.get(side)).unwrap_or(0)
    }

    /// Rebuild the attributed event list from a stored result, ordered by
    /// timestamp (side A first on ties).
    pub fn flatten_events(&self) -> Vec<AttributedEvent> {
        let mut out: Vec<AttributedEvent> = [Side::A, Side::B]
            .into_iter()
            .flat_map(|side| {
                let bucket = self.side(side);
                bucket.events.iter().map(move |e| AttributedEvent {
                    side,
                    game_id: bucket.game_id.clone(),
                    event: e.clone(),
                })
            })
            .collect();
        // Stable sort keeps buffer order for equal timestamps.
        out.sort_by(|x, y| x.event.timestamp.cmp(&y.event.timestamp));
        out
    }
}

fn side_bucket(game: Option<&ActiveGame>) -> SideEvents {
    match game {
        Some(g) => SideEvents {
            game_id: Some(g.id.clone()),
            game_name: Some(g.display_name()),
            events: Vec::new(),
        },
        None => SideEvents::default(),
    }
}

/// Reduce `events` into per-side lists and per-outcome counts. Unmapped
/// events and events for games on neither side are not counted.
pub fn build_market_results(events: &[NormalizedEvent], active_games: &[ActiveGame]) -> MarketResult {
    let game_a = active_games.iter().find(|g| g.side == Some(Side::A));
    let game_b = active_games.iter().find(|g| g.side == Some(Side::B));

    let mut result = MarketResult {
        total_events: events.len(),
        events_by_side: EventsBySide {
            a: side_bucket(game_a),
            b: side_bucket(game_b),
        },
        summary: Outcome::ALL.iter().map(|o| (*o, SideCounts::default())).collect(),
    };

    for event in events {
        let Some(outcome) = event.mapped_type else { continue };

        let side = if game_a.is_some_and(|g| g.id == event.game_id) {
            Side::A
        } else if game_b.is_some_and(|g| g.id == event.game_id) {
            Side::B
        } else {
            continue;
        };

        let bucket = match side {
            Side::A => &mut result.events_by_side.a,
            Side::B => &mut result.events_by_side.b,
        };
        bucket.events.push(SettledEvent {
            outcome,
            original_type: event.vendor_type.clone(),
            event_name: event.event_name.clone(),
            timestamp: event.timestamp.clone(),
            match_time: event.match_time,
            competitor: event.competitor.clone(),
        });
        result.summary.entry(outcome).or_default().increment(side);
    }

    tracing::debug!(
        total = result.total_events,
        side_a = result.events_by_side.a.events.len(),
        side_b = result.events_by_side.b.events.len(),
        "market results compiled"
    );

    result
}
