//! Outbound fan-out of recorded events, off the engine task.
//!
//! Each sink gets its own worker and bounded queue, so a slow relay never
//! holds up the console or the phase clock. A full queue drops the publish;
//! the event stays buffered for settlement.

use super::types::NormalizedEvent;
use crate::admin::EventRelay;
use crate::engine::Broadcaster;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub enum Sink {
    Broadcast(Arc<dyn Broadcaster>),
    Relay(Arc<dyn EventRelay>),
}

impl Sink {
    fn label(&self) -> &'static str {
        match self {
            Sink::Broadcast(_) => "broadcast",
            Sink::Relay(_) => "relay",
        }
    }

    async fn publish(&self, event: &NormalizedEvent) -> Result<()> {
        match self {
            Sink::Broadcast(b) => b.publish_event(event).await,
            Sink::Relay(r) => r.publish_event(event).await,
        }
    }
}

pub struct EventPublisher {
    label: &'static str,
    tx: mpsc::Sender<NormalizedEvent>,
}

impl EventPublisher {
    /// Spawn the worker. It exits once the publisher is dropped and its
    /// queue is empty.
    pub fn spawn(sink: Sink, capacity: usize) -> Self {
        let label = sink.label();
        let (tx, mut rx) = mpsc::channel::<NormalizedEvent>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.publish(&event).await {
                    tracing::warn!(
                        sink = label,
                        game_id = %event.game_id,
                        market_id = %event.market_id,
                        "failed to publish event: {:#}",
                        e
                    );
                }
            }
            tracing::debug!(sink = label, "event publisher stopped");
        });
        Self { label, tx }
    }

    /// Queue without waiting.
    pub fn publish(&self, event: NormalizedEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => tracing::warn!(
                sink = self.label,
                game_id = %event.game_id,
                event_type = %event.vendor_type,
                "publish queue full, event not published"
            ),
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(sink = self.label, "publisher gone, event not published")
            }
        }
    }
}
