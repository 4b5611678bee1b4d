pub mod games;
pub mod ingestion;
pub mod normalizer;
pub mod publisher;
pub mod simulated;
pub mod types;
pub mod ws;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use types::FeedEnvelope;

/// Where a subscription worker delivers raw payloads. Every worker holds a
/// clone of the same sender, so all live games funnel into one ordered queue.
#[derive(Debug, Clone)]
pub struct FeedRoute {
    pub game_id: String,
    pub market_id: String,
    tx: mpsc::Sender<FeedEnvelope>,
}

impl FeedRoute {
    pub fn new(game_id: &str, market_id: &str, tx: mpsc::Sender<FeedEnvelope>) -> Self {
        Self {
            game_id: game_id.to_string(),
            market_id: market_id.to_string(),
            tx,
        }
    }

    /// Returns false once the consumer is gone.
    pub async fn deliver(&self, payload: String) -> bool {
        self.tx
            .send(FeedEnvelope {
                game_id: self.game_id.clone(),
                market_id: self.market_id.clone(),
                payload,
            })
            .await
            .is_ok()
    }
}

#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Open a subscription on `channel`; inbound payloads go to `route`.
    async fn subscribe(&self, channel: &str, route: FeedRoute) -> Result<Box<dyn FeedSubscription>>;
}

#[async_trait]
pub trait FeedSubscription: Send + Sync {
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}
