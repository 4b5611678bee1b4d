pub mod memory;

pub use memory::MemoryLedger;

use crate::engine::aggregator::{AttributedEvent, MarketResult};
use anyhow::Result;
use async_trait::async_trait;

/// Persistent record of markets and their settlement results.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create a market in the betting state and return its id.
    async fn open_market(&self) -> Result<String>;
    async fn close_market(&self, market_id: &str) -> Result<()>;
    async fn end_game(&self, market_id: &str) -> Result<()>;
    async fn persist_result(&self, market_id: &str, result: &MarketResult) -> Result<()>;
    /// Events of a processed market, rebuilt from its stored result. Empty
    /// for unknown or unsettled markets.
    async fn market_events(&self, market_id: &str) -> Result<Vec<AttributedEvent>>;
}
