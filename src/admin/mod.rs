pub mod auth;
pub mod rest;

use crate::engine::phase::PhaseDurations;
use crate::feed::types::NormalizedEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Where the phase durations for the next automatic cycle come from.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// `Ok(None)` means the source has nothing configured.
    async fn phase_durations(&self) -> Result<Option<PhaseDurations>>;
}

/// External relay that receives every normalized live event.
#[async_trait]
pub trait EventRelay: Send + Sync {
    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()>;
}

/// Durations fixed at startup (from config.toml).
pub struct StaticSettings(pub Option<PhaseDurations>);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn phase_durations(&self) -> Result<Option<PhaseDurations>> {
        Ok(self.0)
    }
}
