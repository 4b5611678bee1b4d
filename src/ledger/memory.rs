use super::Ledger;
use crate::engine::aggregator::{AttributedEvent, MarketResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Betting,
    Game,
    Processing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct MarketRecord {
    pub market_id: String,
    pub status: MarketStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub game_ended_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub result: Option<MarketResult>,
}

/// Markets kept by default; at 10/60/10 roughly eleven hours of history.
pub const DEFAULT_RETAINED_MARKETS: usize = 500;

#[derive(Default)]
struct Book {
    markets: HashMap<String, MarketRecord>,
    order: VecDeque<String>, // oldest first
}

/// In-process ledger. Market ids follow `market_YYYYMMDD_HHMMSS_mmm`.
/// Only the newest `retained` markets are kept; opening one more drops the
/// oldest.
pub struct MemoryLedger {
    book: Mutex<Book>,
    retained: usize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_MARKETS)
    }

    pub fn with_retention(retained: usize) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            retained: retained.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn market(&self, market_id: &str) -> Option<MarketRecord> {
        self.lock().markets.get(market_id).cloned()
    }

    pub fn market_count(&self) -> usize {
        self.lock().markets.len()
    }

    fn update(&self, market_id: &str, f: impl FnOnce(&mut MarketRecord)) -> Result<()> {
        let mut book = self.lock();
        let Some(record) = book.markets.get_mut(market_id) else {
            bail!("unknown market {}", market_id);
        };
        f(record);
        Ok(())
    }
}

pub fn market_id_at(now: DateTime<Utc>) -> String {
    now.format("market_%Y%m%d_%H%M%S_%3f").to_string()
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn open_market(&self) -> Result<String> {
        let now = Utc::now();
        let base = market_id_at(now);
        let mut book = self.lock();
        let mut id = base.clone();
        let mut n = 1;
        while book.markets.contains_key(&id) {
            n += 1;
            id = format!("{}_{}", base, n);
        }
        book.markets.insert(
            id.clone(),
            MarketRecord {
                market_id: id.clone(),
                status: MarketStatus::Betting,
                opened_at: now,
                closed_at: None,
                game_ended_at: None,
                processed_at: None,
                result: None,
            },
        );
        book.order.push_back(id.clone());
        while book.order.len() > self.retained {
            if let Some(old) = book.order.pop_front() {
                book.markets.remove(&old);
                tracing::debug!(market_id = %old, "market dropped from ledger");
            }
        }
        tracing::debug!(market_id = %id, "market opened");
        Ok(id)
    }

    async fn close_market(&self, market_id: &str) -> Result<()> {
        self.update(market_id, |m| {
            m.status = MarketStatus::Game;
            m.closed_at = Some(Utc::now());
        })
    }

    async fn end_game(&self, market_id: &str) -> Result<()> {
        self.update(market_id, |m| {
            m.status = MarketStatus::Processing;
            m.game_ended_at = Some(Utc::now());
        })
    }

    async fn persist_result(&self, market_id: &str, result: &MarketResult) -> Result<()> {
        self.update(market_id, |m| {
            m.status = MarketStatus::Completed;
            m.processed_at = Some(Utc::now());
            m.result = Some(result.clone());
        })
    }

    async fn market_events(&self, market_id: &str) -> Result<Vec<AttributedEvent>> {
        Ok(self
            .lock()
            .markets
            .get(market_id)
            .and_then(|m| m.result.as_ref())
            .map(|r| r.flatten_events())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::aggregator::build_market_results;
    use crate::feed::normalizer::normalize;
    use crate::feed::types::{ActiveGame, Side};
    use chrono::TimeZone;

    #[test]
    fn test_market_id_format() {
        let t = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap() + chrono::Duration::milliseconds(42);
        assert_eq!(market_id_at(t), "market_20260307_090502_042");
    }

    #[tokio::test]
    async fn test_lifecycle_statuses() {
        let ledger = MemoryLedger::new();
        let id = ledger.open_market().await.unwrap();
        assert!(id.starts_with("market_"));
        assert_eq!(ledger.market(&id).unwrap().status, MarketStatus::Betting);

        ledger.close_market(&id).await.unwrap();
        assert_eq!(ledger.market(&id).unwrap().status, MarketStatus::Game);
        ledger.end_game(&id).await.unwrap();
        let record = ledger.market(&id).unwrap();
        assert_eq!(record.status, MarketStatus::Processing);
        assert!(record.closed_at.is_some());
        assert!(record.game_ended_at.is_some());

        ledger.persist_result(&id, &MarketResult::empty()).await.unwrap();
        assert_eq!(ledger.market(&id).unwrap().status, MarketStatus::Completed);
    }

    #[tokio::test]
    async fn test_ids_do_not_collide() {
        let ledger = MemoryLedger::new();
        let mut ids = Vec::new();
        for _ in 0..20 {
            ids.push(ledger.open_market().await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(ledger.market_count(), 20);
    }

    #[tokio::test]
    async fn test_unknown_market_is_an_error() {
        let ledger = MemoryLedger::new();
        assert!(ledger.close_market("market_missing").await.is_err());
    }

    #[tokio::test]
    async fn test_market_events_from_stored_result() {
        let ledger = MemoryLedger::new();
        let id = ledger.open_market().await.unwrap();
        let games = vec![ActiveGame {
            id: "g1".into(),
            side: Some(Side::B),
            home_name: "H".into(),
            away_name: "A".into(),
        }];
        let events = vec![
            normalize("g1", &id, r#"{"event":{"type":"goal","time":"t2"}}"#).unwrap(),
            normalize("g1", &id, r#"{"event":{"type":"corner_kick","time":"t1"}}"#).unwrap(),
        ];
        ledger
            .persist_result(&id, &build_market_results(&events, &games))
            .await
            .unwrap();

        let stored = ledger.market_events(&id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].event.original_type, "corner_kick");
        assert_eq!(stored[0].side, Side::B);
        assert!(ledger.market_events("market_missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oldest_markets_are_dropped_past_retention() {
        let ledger = MemoryLedger::with_retention(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let id = ledger.open_market().await.unwrap();
            ledger.persist_result(&id, &MarketResult::empty()).await.unwrap();
            ids.push(id);
        }
        assert_eq!(ledger.market_count(), 3);
        assert!(ledger.market(&ids[0]).is_none());
        assert!(ledger.market(&ids[1]).is_none());
        assert_eq!(ledger.market(&ids[4]).unwrap().status, MarketStatus::Completed);
        assert!(ledger.close_market(&ids[0]).await.is_err());
    }
}
