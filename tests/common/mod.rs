#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use market_cycle::admin::{EventRelay, SettingsSource};
use market_cycle::engine::aggregator::{AttributedEvent, MarketResult};
use market_cycle::engine::bets::SharedBetBook;
use market_cycle::engine::phase::{CycleStatus, Phase, PhaseDurations};
use market_cycle::engine::{Broadcaster, Collaborators, MarketCycleEngine};
use market_cycle::feed::games::ActiveGameRoster;
use market_cycle::feed::ingestion::EventIngestionService;
use market_cycle::feed::types::{ActiveGame, NormalizedEvent, Side};
use market_cycle::feed::{FeedRoute, FeedSubscription, LiveFeed};
use market_cycle::ledger::{Ledger, MemoryLedger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct RecordingBroadcaster {
    pub statuses: Mutex<Vec<CycleStatus>>,
    pub events: Mutex<Vec<NormalizedEvent>>,
    pub fail: AtomicBool,
}

impl RecordingBroadcaster {
    pub fn phases(&self) -> Vec<Phase> {
        let mut out: Vec<Phase> = Vec::new();
        for s in self.statuses.lock().unwrap().iter() {
            if out.last() != Some(&s.phase) {
                out.push(s.phase);
            }
        }
        out
    }

    pub fn last(&self) -> Option<CycleStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish_status(&self, status: &CycleStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broadcast transport down");
        }
        Ok(())
    }

    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broadcast transport down");
        }
        Ok(())
    }
}

/// Feed whose subscriptions are driven by the test through the recorded routes.
#[derive(Default)]
pub struct ManualFeed {
    pub routes: Mutex<HashMap<String, FeedRoute>>, // channel -> route
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
    pub fail_teardown: AtomicBool,
    pub fail_subscribe: AtomicBool,
}

impl ManualFeed {
    pub fn route(&self, channel: &str) -> Option<FeedRoute> {
        self.routes.lock().unwrap().get(channel).cloned()
    }

    pub fn live_channels(&self) -> usize {
        self.routes.lock().unwrap().len()
    }
}

/// Shared wrapper so subscriptions can remove their route from the feed.
pub struct SharedManualFeed(pub Arc<ManualFeed>);

#[async_trait]
impl LiveFeed for SharedManualFeed {
    async fn subscribe(&self, channel: &str, route: FeedRoute) -> Result<Box<dyn FeedSubscription>> {
        self.0.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_subscribe.load(Ordering::SeqCst) {
            anyhow::bail!("feed refused subscription to {}", channel);
        }
        self.0
            .routes
            .lock()
            .unwrap()
            .insert(channel.to_string(), route);
        Ok(Box::new(ManualHandle {
            channel: channel.to_string(),
            feed: self.0.clone(),
        }))
    }
}

struct ManualHandle {
    channel: String,
    feed: Arc<ManualFeed>,
}

#[async_trait]
impl FeedSubscription for ManualHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        self.feed.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.feed.fail_teardown.load(Ordering::SeqCst) {
            anyhow::bail!("teardown of {} failed", self.channel);
        }
        self.feed.routes.lock().unwrap().remove(&self.channel);
        Ok(())
    }
}

/// Ledger wrapper that records calls and can be switched to fail.
#[derive(Default)]
pub struct RecordingLedger {
    pub inner: MemoryLedger,
    pub calls: Mutex<Vec<String>>,
    pub results: Mutex<HashMap<String, MarketResult>>,
    pub fail: AtomicBool,
}

impl RecordingLedger {
    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("ledger unavailable");
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn result(&self, market_id: &str) -> Option<MarketResult> {
        self.results.lock().unwrap().get(market_id).cloned()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn open_market(&self) -> Result<String> {
        self.record("open_market".to_string())?;
        self.inner.open_market().await
    }

    async fn close_market(&self, market_id: &str) -> Result<()> {
        self.record(format!("close_market {}", market_id))?;
        self.inner.close_market(market_id).await
    }

    async fn end_game(&self, market_id: &str) -> Result<()> {
        self.record(format!("end_game {}", market_id))?;
        self.inner.end_game(market_id).await
    }

    async fn persist_result(&self, market_id: &str, result: &MarketResult) -> Result<()> {
        self.record(format!("persist_result {}", market_id))?;
        self.results
            .lock()
            .unwrap()
            .insert(market_id.to_string(), result.clone());
        self.inner.persist_result(market_id, result).await
    }

    async fn market_events(&self, market_id: &str) -> Result<Vec<AttributedEvent>> {
        self.inner.market_events(market_id).await
    }
}

/// Relay that takes `delay` per event, like a slow admin endpoint.
pub struct SlowRelay {
    pub delay: Duration,
    pub relayed: AtomicUsize,
}

impl SlowRelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            relayed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventRelay for SlowRelay {
    async fn publish_event(&self, _event: &NormalizedEvent) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.relayed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `check` until it holds, giving spawned publishers time to run.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub struct FixedSettings {
    pub durations: Mutex<Result<Option<PhaseDurations>, String>>,
}

impl FixedSettings {
    pub fn returning(d: Option<PhaseDurations>) -> Self {
        Self {
            durations: Mutex::new(Ok(d)),
        }
    }

    pub fn failing() -> Self {
        Self {
            durations: Mutex::new(Err("settings store down".to_string())),
        }
    }
}

#[async_trait]
impl SettingsSource for FixedSettings {
    async fn phase_durations(&self) -> Result<Option<PhaseDurations>> {
        match &*self.durations.lock().unwrap() {
            Ok(d) => Ok(*d),
            Err(msg) => Err(anyhow::anyhow!(msg.clone())),
        }
    }
}

pub fn game(id: &str, side: Option<Side>) -> ActiveGame {
    ActiveGame {
        id: id.to_string(),
        side,
        home_name: format!("{} home", id),
        away_name: format!("{} away", id),
    }
}

pub const GAME_A: &str = "sr:sport_event:1001";
pub const GAME_B: &str = "sr:sport_event:1002";
pub const CHANNEL_A: &str = "sr:sport_event_id:1001";
pub const CHANNEL_B: &str = "sr:sport_event_id:1002";

pub fn payload(vendor_type: &str) -> String {
    format!(
        r#"{{"event":{{"type":"{}","time":"2026-10-18T12:00:00.000Z","match_time":10,"competitor":"home"}}}}"#,
        vendor_type
    )
}

pub struct Harness {
    pub engine: MarketCycleEngine,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub feed: Arc<ManualFeed>,
    pub ledger: Arc<RecordingLedger>,
    pub roster: ActiveGameRoster,
    pub bets: SharedBetBook,
}

impl Harness {
    pub fn new(durations: PhaseDurations, grace_secs: u32) -> Self {
        Self::build(durations, grace_secs, FixedSettings::returning(None), None)
    }

    pub fn with_settings(durations: PhaseDurations, grace_secs: u32, settings: FixedSettings) -> Self {
        Self::build(durations, grace_secs, settings, None)
    }

    pub fn with_relay(durations: PhaseDurations, grace_secs: u32, relay: Arc<dyn EventRelay>) -> Self {
        Self::build(durations, grace_secs, FixedSettings::returning(None), Some(relay))
    }

    fn build(
        durations: PhaseDurations,
        grace_secs: u32,
        settings: FixedSettings,
        relay: Option<Arc<dyn EventRelay>>,
    ) -> Self {
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let feed = Arc::new(ManualFeed::default());
        let ledger = Arc::new(RecordingLedger::default());
        let roster = ActiveGameRoster::new(vec![game(GAME_A, Some(Side::A)), game(GAME_B, Some(Side::B))]);
        let bets = SharedBetBook::new();

        let ingestion = EventIngestionService::new(
            Arc::new(SharedManualFeed(feed.clone())),
            broadcaster.clone(),
            Arc::new(bets.clone()),
            relay,
            64,
        );
        let engine = MarketCycleEngine::new(
            durations,
            grace_secs,
            Collaborators {
                ledger: ledger.clone(),
                broadcaster: broadcaster.clone(),
                settings: Arc::new(settings),
                games: Arc::new(roster.clone()),
            },
            ingestion,
        );

        Self {
            engine,
            broadcaster,
            feed,
            ledger,
            roster,
            bets,
        }
    }

    pub async fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.engine.tick().await;
        }
    }

    /// Deliver a payload through the live route of `channel` and let the
    /// engine consume it. Returns false if the channel is not subscribed.
    pub async fn push(&mut self, channel: &str, payload: String) -> bool {
        let Some(route) = self.feed.route(channel) else {
            return false;
        };
        route.deliver(payload).await;
        match self.engine.next_envelope().await {
            Some(envelope) => {
                self.engine.ingest(envelope).await;
                true
            }
            None => false,
        }
    }
}

pub fn durations(betting: u32, game: u32, interval: u32) -> PhaseDurations {
    PhaseDurations {
        betting_secs: betting,
        game_secs: game,
        interval_secs: interval,
    }
}
