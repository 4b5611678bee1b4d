//! Per-game live-feed subscriptions feeding per-market event buffers.

use super::normalizer::{channel_for_game, normalize};
use super::publisher::{EventPublisher, Sink};
use super::types::{FeedEnvelope, NormalizedEvent};
use super::{FeedRoute, FeedSubscription, LiveFeed};
use crate::admin::EventRelay;
use crate::engine::bets::PendingBetsNotifier;
use crate::engine::Broadcaster;
use crate::error::EventError;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

struct ActiveSubscription {
    market_id: String,
    handle: Box<dyn FeedSubscription>,
}

pub struct EventIngestionService {
    feed: Arc<dyn LiveFeed>,
    notifier: Arc<dyn PendingBetsNotifier>,
    publishers: Vec<EventPublisher>,
    subscriptions: HashMap<String, ActiveSubscription>, // game_id -> subscription
    buffers: HashMap<String, Vec<NormalizedEvent>>,     // market_id -> events
    inbound_tx: mpsc::Sender<FeedEnvelope>,
    inbound_rx: mpsc::Receiver<FeedEnvelope>,
}

impl EventIngestionService {
    /// Build the service with the single inbound queue every subscription
    /// worker delivers into, and spawn one publisher per outbound sink.
    /// Must be called inside a tokio runtime.
    pub fn new(
        feed: Arc<dyn LiveFeed>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Arc<dyn PendingBetsNotifier>,
        relay: Option<Arc<dyn EventRelay>>,
        capacity: usize,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let mut publishers = vec![EventPublisher::spawn(Sink::Broadcast(broadcaster), capacity)];
        if let Some(relay) = relay {
            publishers.push(EventPublisher::spawn(Sink::Relay(relay), capacity));
        }
        Self {
            feed,
            notifier,
            publishers,
            subscriptions: HashMap::new(),
            buffers: HashMap::new(),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Next payload delivered by any worker. Cancel safe.
    pub async fn next_envelope(&mut self) -> Option<FeedEnvelope> {
        self.inbound_rx.recv().await
    }

    /// Record everything already queued by the workers. Returns how many
    /// envelopes were taken.
    pub async fn drain_inbound(&mut self) -> usize {
        let mut taken = 0;
        while let Ok(envelope) = self.inbound_rx.try_recv() {
            self.record_envelope(envelope).await;
            taken += 1;
        }
        taken
    }

    pub async fn start_listening_to_game(&mut self, game_id: &str, market_id: &str) -> Result<()> {
        if self.subscriptions.contains_key(game_id) {
            tracing::debug!(game_id, "already listening to game");
            return Ok(());
        }

        let channel = channel_for_game(game_id);
        let route = FeedRoute::new(game_id, market_id, self.inbound_tx.clone());
        let handle = self.feed.subscribe(&channel, route).await?;

        self.subscriptions.insert(
            game_id.to_string(),
            ActiveSubscription {
                market_id: market_id.to_string(),
                handle,
            },
        );
        self.buffers.entry(market_id.to_string()).or_default();

        tracing::info!(game_id, market_id, channel = %channel, "listening to game events");
        Ok(())
    }

    /// Teardown failures are logged; the subscription is forgotten either way.
    pub async fn stop_listening_to_game(&mut self, game_id: &str) {
        let Some(sub) = self.subscriptions.remove(game_id) else {
            return;
        };
        match sub.handle.unsubscribe().await {
            Ok(()) => tracing::info!(game_id, market_id = %sub.market_id, "stopped listening to game"),
            Err(e) => tracing::error!(
                game_id,
                market_id = %sub.market_id,
                "failed to stop listening to game: {:#}",
                e
            ),
        }
    }

    pub async fn stop_all(&mut self) {
        let game_ids: Vec<String> = self.subscriptions.keys().cloned().collect();
        if !game_ids.is_empty() {
            tracing::info!(count = game_ids.len(), "stopping all game listeners");
        }
        for game_id in game_ids {
            self.stop_listening_to_game(&game_id).await;
        }
    }

    pub fn is_listening(&self, game_id: &str) -> bool {
        self.subscriptions.contains_key(game_id)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub async fn record_envelope(&mut self, envelope: FeedEnvelope) {
        self.record_event(&envelope.game_id, &envelope.market_id, &envelope.payload)
            .await;
    }

    /// Normalize one inbound payload, buffer it, and fan it out.
    pub async fn record_event(&mut self, game_id: &str, market_id: &str, raw: &str) {
        let event = match normalize(game_id, market_id, raw) {
            Ok(ev) => ev,
            Err(EventError::MissingType) => {
                tracing::debug!(game_id, market_id, "dropping feed message without event type");
                return;
            }
            Err(e) => {
                tracing::warn!(game_id, market_id, "dropping feed message: {}", e);
                return;
            }
        };

        let Some(buffer) = self.buffers.get_mut(market_id) else {
            tracing::warn!(
                game_id,
                market_id,
                event_type = %event.vendor_type,
                "dropping event for a market that is no longer buffered"
            );
            return;
        };
        buffer.push(event.clone());

        tracing::info!(
            game_id,
            market_id,
            event_type = %event.vendor_type,
            mapped = ?event.mapped_type,
            competitor = ?event.competitor,
            match_time = ?event.match_time,
            "event recorded"
        );

        if let Some(outcome) = event.mapped_type {
            match self.notifier.annotate(market_id, game_id, outcome, &event).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(game_id, market_id, %outcome, bets = n, "pending bets annotated"),
                Err(e) => tracing::warn!(game_id, market_id, %outcome, "failed to annotate pending bets: {:#}", e),
            }
        }

        for publisher in &self.publishers {
            publisher.publish(event.clone());
        }
    }

    pub fn is_buffering(&self, market_id: &str) -> bool {
        self.buffers.contains_key(market_id)
    }

    pub fn get_market_events(&self, market_id: &str) -> Vec<NormalizedEvent> {
        self.buffers.get(market_id).cloned().unwrap_or_default()
    }

    pub fn clear_market_events(&mut self, market_id: &str) {
        if let Some(events) = self.buffers.remove(market_id) {
            tracing::debug!(market_id, count = events.len(), "market events cleared");
        }
    }

    pub async fn shutdown(&mut self) {
        tracing::info!("shutting down event ingestion");
        self.stop_all().await;
        self.buffers.clear();
        self.publishers.clear();
    }
}
