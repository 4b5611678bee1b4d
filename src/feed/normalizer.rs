//! Vendor live-feed taxonomy → internal outcome taxonomy.

use super::types::{NormalizedEvent, Outcome, VendorMessage};
use crate::error::EventError;
use std::borrow::Cow;

/// Vendor event types the feed is known to emit, with their settlement
/// category (if any) and display name.
const EVENT_TABLE: &[(&str, Option<Outcome>, &str)] = &[
    ("throw_in", Some(Outcome::Side), "Throw-in"),
    ("free_kick", Some(Outcome::Foul), "Free kick"),
    ("yellow_card", None, "Yellow card"),
    ("red_card", None, "Red card"),
    ("goal_kick", None, "Goal kick"),
    ("corner_kick", Some(Outcome::Corner), "Corner kick"),
    ("shot_on_target", None, "Shot on target"),
    ("shot_saved", None, "Shot saved"),
    ("shot_off_target", None, "Shot off target"),
    ("injury_return", None, "Injury return"),
    ("injury", None, "Injury"),
    ("goal", Some(Outcome::Goal), "Goal"),
    ("offside", None, "Offside"),
];

/// All vendor types in the table, in table order.
pub fn known_vendor_types() -> impl Iterator<Item = &'static str> {
    EVENT_TABLE.iter().map(|(t, _, _)| *t)
}

pub fn map_event_type(vendor_type: &str) -> Option<Outcome> {
    EVENT_TABLE
        .iter()
        .find(|(t, _, _)| *t == vendor_type)
        .and_then(|(_, outcome, _)| *outcome)
}

/// Unknown vendor types display as themselves.
pub fn display_name(vendor_type: &str) -> Cow<'static, str> {
    match EVENT_TABLE.iter().find(|(t, _, _)| *t == vendor_type) {
        Some((_, _, name)) => Cow::Borrowed(name),
        None => Cow::Owned(vendor_type.to_string()),
    }
}

/// Parse a raw feed payload and build the normalized event for it.
pub fn normalize(game_id: &str, market_id: &str, payload: &str) -> Result<NormalizedEvent, EventError> {
    let msg: VendorMessage = serde_json::from_str(payload)?;
    let event = msg.event.ok_or(EventError::MissingType)?;
    let vendor_type = match event.event_type {
        Some(t) if !t.is_empty() => t,
        _ => return Err(EventError::MissingType),
    };
    let status = msg.sport_event_status;

    Ok(NormalizedEvent {
        game_id: game_id.to_string(),
        market_id: market_id.to_string(),
        mapped_type: map_event_type(&vendor_type),
        event_name: display_name(&vendor_type).into_owned(),
        timestamp: event
            .time
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        match_time: event.match_time,
        match_clock: event.match_clock,
        competitor: event.competitor,
        period: event.period,
        period_type: event.period_type,
        x: event.x,
        y: event.y,
        status: status.as_ref().and_then(|s| s.status.clone()),
        match_status: status.as_ref().and_then(|s| s.match_status.clone()),
        home_score: status.as_ref().and_then(|s| s.home_score),
        away_score: status.as_ref().and_then(|s| s.away_score),
        vendor_type,
    })
}

/// Live-feed channel for a game id: `sr:sport_event:123` → `sr:sport_event_id:123`.
pub fn channel_for_game(game_id: &str) -> String {
    let event_id = game_id.rsplit(':').next().unwrap_or(game_id);
    format!("sr:sport_event_id:{}", event_id)
}
