//! Phase state machine of the recurring market.
//!
//! Betting -> Game -> Processing -> (grace) -> Interval -> Betting | Stopped.
//! Every phase is counted down by `tick()`, called once per second by the
//! runtime while `is_ticking()` holds.

use super::aggregator::{build_market_results, AttributedEvent};
use super::phase::{Countdown, CycleStatus, Phase, PhaseDurations, Step};
use super::Broadcaster;
use crate::admin::SettingsSource;
use crate::error::CycleError;
use crate::feed::games::ActiveGamesProvider;
use crate::feed::ingestion::EventIngestionService;
use crate::feed::types::{FeedEnvelope, NormalizedEvent, Outcome, Side};
use crate::ledger::Ledger;
use std::sync::Arc;

pub const DEFAULT_PROCESSING_GRACE_SECS: u32 = 2;

/// External services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub settings: Arc<dyn SettingsSource>,
    pub games: Arc<dyn ActiveGamesProvider>,
}

/// Events of one market, from wherever they currently live.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvents {
    /// Still being collected, in arrival order.
    Live(Vec<NormalizedEvent>),
    /// Processed; attributed events rebuilt from the stored result.
    Settled(Vec<AttributedEvent>),
}

impl MarketEvents {
    pub fn len(&self) -> usize {
        match self {
            MarketEvents::Live(e) => e.len(),
            MarketEvents::Settled(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MarketCycleEngine {
    durations: PhaseDurations,
    grace_secs: u32,
    phase: Phase,
    automatic: bool,
    betting_open: bool,
    countdown: Countdown,
    market_id: Option<String>,
    ticking: bool,
    collab: Collaborators,
    ingestion: EventIngestionService,
}

impl MarketCycleEngine {
    pub fn new(
        durations: PhaseDurations,
        grace_secs: u32,
        collab: Collaborators,
        ingestion: EventIngestionService,
    ) -> Self {
        Self {
            durations: durations.sanitized(),
            grace_secs,
            phase: Phase::Stopped,
            automatic: false,
            betting_open: false,
            countdown: Countdown::default(),
            market_id: None,
            ticking: false,
            collab,
            ingestion,
        }
    }

    pub fn status(&self) -> CycleStatus {
        CycleStatus {
            phase: self.phase,
            automatic: self.automatic,
            betting_open: self.betting_open,
            can_place_bet: self.can_place_bet(),
            betting_remaining: self.countdown.betting,
            game_remaining: self.countdown.game,
            interval_remaining: self.countdown.interval,
            market_id: self.market_id.clone(),
            durations: self.durations,
        }
    }

    pub fn durations(&self) -> PhaseDurations {
        self.durations
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn can_place_bet(&self) -> bool {
        self.betting_open && self.phase == Phase::Betting && self.countdown.betting > 0
    }

    pub fn active_subscriptions(&self) -> usize {
        self.ingestion.active_subscriptions()
    }

    /// Live buffer while the market is collecting, the ledger's settled
    /// record once it has been processed.
    pub async fn market_events(&self, market_id: &str) -> MarketEvents {
        if self.ingestion.is_buffering(market_id) {
            return MarketEvents::Live(self.ingestion.get_market_events(market_id));
        }
        match self.collab.ledger.market_events(market_id).await {
            Ok(events) => MarketEvents::Settled(events),
            Err(e) => {
                tracing::warn!(market_id, "failed to read settled events: {:#}", e);
                MarketEvents::Settled(Vec::new())
            }
        }
    }

    pub async fn next_envelope(&mut self) -> Option<FeedEnvelope> {
        self.ingestion.next_envelope().await
    }

    pub async fn ingest(&mut self, envelope: FeedEnvelope) {
        self.ingestion.record_envelope(envelope).await;
    }

    /// Record every payload the workers have already queued.
    pub async fn ingest_pending(&mut self) -> usize {
        self.ingestion.drain_inbound().await
    }

    /// Refresh durations from the settings source. Keeps the current values
    /// on error, on absence, and field by field for zeros.
    pub async fn load_phase_durations(&mut self) {
        match self.collab.settings.phase_durations().await {
            Ok(Some(loaded)) => {
                self.durations = loaded.or(self.durations);
                tracing::info!(
                    betting = self.durations.betting_secs,
                    game = self.durations.game_secs,
                    interval = self.durations.interval_secs,
                    "phase durations loaded"
                );
            }
            Ok(None) => tracing::debug!("no phase durations configured, keeping current"),
            Err(e) => tracing::warn!("failed to load phase durations, keeping current: {:#}", e),
        }
    }

    pub async fn start_automatic_cycle(&mut self) -> Result<(), CycleError> {
        if self.automatic {
            return Err(CycleError::AlreadyRunning);
        }
        self.load_phase_durations().await;
        self.automatic = true;
        tracing::info!(phase = %self.phase, "automatic cycle started");

        // A one-shot window or market already in flight carries on and the
        // loop takes over at its end.
        if let Err(e) = self.enter_betting().await {
            tracing::info!(phase = %self.phase, "automatic cycle joins current market: {}", e);
        }
        Ok(())
    }

    /// Always broadcasts; teardown is a no-op when nothing is running.
    pub async fn stop_automatic_cycle(&mut self) {
        self.automatic = false;
        self.betting_open = false;
        self.ticking = false;
        self.phase = Phase::Stopped;
        self.countdown = Countdown::default();
        let stale = self.market_id.take();
        tracing::info!(market_id = ?stale, "automatic cycle stopped");
        self.broadcast_status().await;

        self.ingestion.stop_all().await;
        if let Some(market_id) = stale {
            self.ingestion.clear_market_events(&market_id);
        }
    }

    pub async fn enter_betting(&mut self) -> Result<(), CycleError> {
        if self.betting_open {
            return Err(CycleError::AlreadyOpen);
        }
        if matches!(self.phase, Phase::Game | Phase::Processing) {
            return Err(CycleError::Busy(self.phase));
        }

        self.betting_open = true;
        self.phase = Phase::Betting;
        self.countdown = Countdown {
            betting: self.durations.betting_secs,
            ..Default::default()
        };

        self.market_id = match self.collab.ledger.open_market().await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(phase = %self.phase, "failed to open market: {:#}", e);
                None
            }
        };

        if self.active_subscriptions() > 0 {
            tracing::warn!(
                count = self.active_subscriptions(),
                "leftover game subscriptions before new market"
            );
            self.ingestion.stop_all().await;
        }

        if let Some(market_id) = self.market_id.clone() {
            let games = self.collab.games.list_active_games();
            tracing::info!(
                market_id = %market_id,
                games = games.len(),
                betting_secs = self.durations.betting_secs,
                "betting open"
            );
            for game in games {
                if let Err(e) = self.ingestion.start_listening_to_game(&game.id, &market_id).await {
                    tracing::error!(
                        market_id = %market_id,
                        game_id = %game.id,
                        "failed to subscribe to game: {:#}",
                        e
                    );
                }
            }
        }

        self.broadcast_status().await;
        self.ticking = true;
        Ok(())
    }

    /// Advance the current phase by one second.
    pub async fn tick(&mut self) {
        if !self.ticking {
            return;
        }
        match self.countdown.step(self.phase) {
            Step::Idle => {}
            Step::Running => {
                if self.phase != Phase::Processing {
                    self.broadcast_status().await;
                }
            }
            Step::Expired => match self.phase {
                Phase::Betting => {
                    self.broadcast_status().await;
                    if let Err(e) = self.close_betting().await {
                        tracing::warn!(phase = %self.phase, "close betting on expiry: {}", e);
                    }
                }
                Phase::Game => {
                    self.broadcast_status().await;
                    self.end_game().await;
                }
                Phase::Processing => self.start_interval().await,
                Phase::Interval => {
                    self.broadcast_status().await;
                    self.end_interval().await;
                }
                Phase::Stopped => {}
            },
        }
    }

    pub async fn close_betting(&mut self) -> Result<(), CycleError> {
        if !self.betting_open {
            return Err(CycleError::NotOpen);
        }
        self.betting_open = false;
        self.phase = Phase::Game;
        self.countdown.betting = 0;
        self.countdown.game = self.durations.game_secs;

        if let Some(market_id) = &self.market_id {
            tracing::info!(market_id = %market_id, game_secs = self.durations.game_secs, "betting closed, game started");
            if let Err(e) = self.collab.ledger.close_market(market_id).await {
                tracing::error!(market_id = %market_id, phase = %self.phase, "failed to close market: {:#}", e);
            }
        }

        self.broadcast_status().await;
        Ok(())
    }

    /// Stop ingestion, settle the buffered events and persist the result.
    pub async fn end_game(&mut self) {
        self.phase = Phase::Processing;
        self.countdown.game = 0;
        self.broadcast_status().await;

        self.ingestion.stop_all().await;
        // Workers are gone; whatever they queued belongs to this market.
        let late = self.ingest_pending().await;
        if late > 0 {
            tracing::debug!(market_id = ?self.market_id, count = late, "queued events recorded before settlement");
        }

        if let Some(market_id) = self.market_id.clone() {
            if let Err(e) = self.collab.ledger.end_game(&market_id).await {
                tracing::error!(market_id = %market_id, phase = %self.phase, "failed to end game: {:#}", e);
            }

            let events = self.ingestion.get_market_events(&market_id);
            let games = self.collab.games.list_active_games();
            let result = build_market_results(&events, &games);
            tracing::info!(
                market_id = %market_id,
                total = result.total_events,
                side_a = result.events_by_side.a.events.len(),
                side_b = result.events_by_side.b.events.len(),
                goals_a = result.count(Outcome::Goal, Side::A),
                goals_b = result.count(Outcome::Goal, Side::B),
                "market settled"
            );

            if let Err(e) = self.collab.ledger.persist_result(&market_id, &result).await {
                tracing::error!(market_id = %market_id, phase = %self.phase, "failed to persist result: {:#}", e);
            }
            self.ingestion.clear_market_events(&market_id);
        }

        if self.grace_secs == 0 {
            self.start_interval().await;
        } else {
            self.countdown.grace = self.grace_secs;
        }
    }

    pub async fn start_interval(&mut self) {
        self.phase = Phase::Interval;
        self.countdown.grace = 0;
        self.countdown.interval = self.durations.interval_secs;
        tracing::info!(interval_secs = self.durations.interval_secs, "interval started");
        self.broadcast_status().await;
    }

    pub async fn end_interval(&mut self) {
        self.countdown.interval = 0;
        if self.automatic {
            if let Err(e) = self.enter_betting().await {
                tracing::error!(phase = %self.phase, "failed to reopen betting: {}", e);
            }
        } else {
            self.phase = Phase::Stopped;
            self.ticking = false;
            self.market_id = None;
            tracing::info!("cycle finished");
            self.broadcast_status().await;
        }
    }

    pub async fn shutdown(&mut self) {
        self.stop_automatic_cycle().await;
        self.ingestion.shutdown().await;
    }

    async fn broadcast_status(&self) {
        let status = self.status();
        if let Err(e) = self.collab.broadcaster.publish_status(&status).await {
            tracing::warn!(
                phase = %status.phase,
                market_id = ?status.market_id,
                "failed to broadcast status: {:#}",
                e
            );
        }
    }
}
