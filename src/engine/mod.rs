pub mod aggregator;
pub mod bets;
pub mod cycle;
pub mod phase;
pub mod runtime;

pub use aggregator::{build_market_results, MarketResult};
pub use bets::{PendingBetRegistry, SharedBetBook};
pub use cycle::{Collaborators, MarketCycleEngine, MarketEvents};
pub use phase::{CycleStatus, Phase, PhaseDurations};
pub use runtime::{CycleHandle, CycleRuntime};

use crate::feed::types::NormalizedEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Real-time fan-out of cycle status and live events.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish_status(&self, status: &CycleStatus) -> Result<()>;
    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()>;
}

/// Broadcaster that only writes to the log. Used in headless mode.
pub struct TracingBroadcaster;

#[async_trait]
impl Broadcaster for TracingBroadcaster {
    async fn publish_status(&self, status: &CycleStatus) -> Result<()> {
        if status.is_boundary() {
            tracing::info!(
                phase = %status.phase,
                remaining = status.remaining(),
                market_id = ?status.market_id,
                automatic = status.automatic,
                "cycle status"
            );
        } else {
            tracing::trace!(phase = %status.phase, remaining = status.remaining(), "tick");
        }
        Ok(())
    }

    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()> {
        tracing::info!(
            game_id = %event.game_id,
            market_id = %event.market_id,
            event = %event.event_name,
            "live event"
        );
        Ok(())
    }
}
