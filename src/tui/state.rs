use crate::engine::cycle::MarketEvents;
use crate::engine::phase::{CycleStatus, Phase, PhaseDurations};
use crate::feed::types::{NormalizedEvent, Side};
use std::collections::VecDeque;
use std::time::Instant;

const MAX_EVENTS: usize = 100;
const MAX_LOGS: usize = 200;

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: CycleStatus,
    pub start_time: Instant,
    pub simulated: bool,
    pub active_games: usize,
    pub markets_opened: u32,
    pub events: VecDeque<EventRow>,
    pub logs: VecDeque<LogEntry>,
    pub log_focus: bool,
    pub log_scroll_offset: usize,
}

#[derive(Debug, Clone)]
pub struct EventRow {
    pub time: String,
    pub game_id: String,
    pub event_name: String,
    pub outcome: Option<String>,
    pub match_time: Option<u32>,
    pub competitor: Option<String>,
}

impl From<&NormalizedEvent> for EventRow {
    fn from(ev: &NormalizedEvent) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            game_id: ev.game_id.clone(),
            event_name: ev.event_name.clone(),
            outcome: ev.mapped_type.map(|o| o.to_string()),
            match_time: ev.match_time,
            competitor: ev.competitor.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            status: CycleStatus {
                phase: Phase::Stopped,
                automatic: false,
                betting_open: false,
                can_place_bet: false,
                betting_remaining: 0,
                game_remaining: 0,
                interval_remaining: 0,
                market_id: None,
                durations: PhaseDurations::default(),
            },
            start_time: Instant::now(),
            simulated: false,
            active_games: 0,
            markets_opened: 0,
            events: VecDeque::with_capacity(MAX_EVENTS),
            logs: VecDeque::with_capacity(MAX_LOGS),
            log_focus: false,
            log_scroll_offset: 0,
        }
    }

    /// Apply a status snapshot, logging phase changes.
    pub fn apply_status(&mut self, status: &CycleStatus) {
        if status.phase != self.status.phase {
            self.push_log("INFO", format!("phase {} -> {}", self.status.phase, status.phase));
        }
        if status.market_id.is_some() && status.market_id != self.status.market_id {
            self.markets_opened += 1;
            if let Some(id) = &status.market_id {
                self.push_log("INFO", format!("market {} opened", id));
            }
        }
        self.status = status.clone();
    }

    pub fn push_event(&mut self, event: &NormalizedEvent) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(EventRow::from(event));
    }

    pub fn push_log(&mut self, level: &str, message: String) {
        let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        if self.logs.len() >= MAX_LOGS {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            time,
            level: level.to_string(),
            message,
        });
    }

    pub fn push_market_summary(&mut self, market_id: &str, events: &MarketEvents) {
        let line = match events {
            MarketEvents::Live(evs) => {
                let mapped = evs.iter().filter(|e| e.mapped_type.is_some()).count();
                format!("{}: collecting, {} events ({} mapped)", market_id, evs.len(), mapped)
            }
            MarketEvents::Settled(evs) => {
                let a = evs.iter().filter(|e| e.side == Side::A).count();
                format!("{}: settled, A {} / B {}", market_id, a, evs.len() - a)
            }
        };
        self.push_log("INFO", line);
    }

    pub fn uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        format!("{}h {:02}m", h, m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::normalizer::normalize;

    fn status(phase: Phase, market_id: Option<&str>) -> CycleStatus {
        CycleStatus {
            phase,
            market_id: market_id.map(str::to_string),
            ..AppState::new().status
        }
    }

    #[test]
    fn test_apply_status_counts_new_markets() {
        let mut state = AppState::new();
        state.apply_status(&status(Phase::Betting, Some("m1")));
        state.apply_status(&status(Phase::Betting, Some("m1")));
        state.apply_status(&status(Phase::Game, Some("m1")));
        state.apply_status(&status(Phase::Betting, Some("m2")));
        assert_eq!(state.markets_opened, 2);
        assert_eq!(state.status.phase, Phase::Betting);
        // Three phase changes plus two market openings.
        assert_eq!(state.logs.len(), 5);
    }

    #[test]
    fn test_event_buffer_is_bounded() {
        let mut state = AppState::new();
        let ev = normalize("g1", "m1", r#"{"event":{"type":"goal"}}"#).unwrap();
        for _ in 0..(MAX_EVENTS + 5) {
            state.push_event(&ev);
        }
        assert_eq!(state.events.len(), MAX_EVENTS);
        assert_eq!(state.events[0].outcome.as_deref(), Some("goal"));
    }

    #[test]
    fn test_market_summary_lines() {
        let mut state = AppState::new();
        let goal = normalize("g1", "m1", r#"{"event":{"type":"goal"}}"#).unwrap();
        let offside = normalize("g1", "m1", r#"{"event":{"type":"offside"}}"#).unwrap();
        state.push_market_summary("m1", &MarketEvents::Live(vec![goal, offside]));
        assert_eq!(state.logs.back().unwrap().message, "m1: collecting, 2 events (1 mapped)");

        state.push_market_summary("m1", &MarketEvents::Settled(Vec::new()));
        assert_eq!(state.logs.back().unwrap().message, "m1: settled, A 0 / B 0");
    }
}
