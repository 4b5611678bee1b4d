use crate::feed::types::{NormalizedEvent, Outcome, Side};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Receives every mapped live event so matching wagers can be annotated.
#[async_trait]
pub trait PendingBetsNotifier: Send + Sync {
    /// Returns how many bets were annotated.
    async fn annotate(
        &self,
        market_id: &str,
        game_id: &str,
        outcome: Outcome,
        event: &NormalizedEvent,
    ) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetLog {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub event_type: String,
    pub mapped_type: Outcome,
    pub event_name: String,
    pub game_id: String,
    pub market_id: String,
    pub competitor: Option<String>,
    pub match_time: Option<u32>,
    pub match_clock: Option<String>,
    pub timestamp: String,
    pub bet_selected_side: Side,
}

#[derive(Debug, Clone)]
pub struct PendingBet {
    pub bet_id: String,
    pub market_id: String,
    pub game_id: String,
    pub outcome: Outcome,
    pub selected_side: Side,
    pub logs: Vec<BetLog>,
}

/// Open wagers awaiting settlement.
pub struct PendingBetRegistry {
    bets: HashMap<String, PendingBet>, // bet_id -> bet
}

impl Default for PendingBetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingBetRegistry {
    pub fn new() -> Self {
        Self {
            bets: HashMap::new(),
        }
    }

    /// Register a bet. Returns false if the id is already known.
    pub fn try_register(
        &mut self,
        bet_id: String,
        market_id: String,
        game_id: String,
        outcome: Outcome,
        selected_side: Side,
    ) -> bool {
        if self.bets.contains_key(&bet_id) {
            return false;
        }
        self.bets.insert(
            bet_id.clone(),
            PendingBet {
                bet_id,
                market_id,
                game_id,
                outcome,
                selected_side,
                logs: Vec::new(),
            },
        );
        true
    }

    pub fn logs(&self, bet_id: &str) -> &[BetLog] {
        self.bets.get(bet_id).map(|b| b.logs.as_slice()).unwrap_or(&[])
    }

    /// Append an `event_occurred` log to every bet on this
    /// (market, game, outcome).
    pub fn annotate_matching(
        &mut self,
        market_id: &str,
        game_id: &str,
        outcome: Outcome,
        event: &NormalizedEvent,
    ) -> usize {
        let mut annotated = 0;
        for bet in self.bets.values_mut() {
            if bet.market_id != market_id || bet.game_id != game_id || bet.outcome != outcome {
                continue;
            }
            bet.logs.push(BetLog {
                kind: "event_occurred",
                event_type: event.vendor_type.clone(),
                mapped_type: outcome,
                event_name: event.event_name.clone(),
                game_id: game_id.to_string(),
                market_id: market_id.to_string(),
                competitor: event.competitor.clone(),
                match_time: event.match_time,
                match_clock: event.match_clock.clone(),
                timestamp: event.timestamp.clone(),
                bet_selected_side: bet.selected_side,
            });
            annotated += 1;
        }
        annotated
    }
}

/// Shared handle to a registry, usable as the ingestion notifier.
#[derive(Clone, Default)]
pub struct SharedBetBook(Arc<Mutex<PendingBetRegistry>>);

impl SharedBetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut PendingBetRegistry) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl PendingBetsNotifier for SharedBetBook {
    async fn annotate(
        &self,
        market_id: &str,
        game_id: &str,
        outcome: Outcome,
        event: &NormalizedEvent,
    ) -> Result<usize> {
        Ok(self.with(|reg| reg.annotate_matching(market_id, game_id, outcome, event)))
    }
}
