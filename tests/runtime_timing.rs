mod common;

use common::*;
use market_cycle::engine::phase::Phase;
use market_cycle::engine::{CycleRuntime, MarketEvents};
use market_cycle::error::CycleError;
use market_cycle::feed::types::{Outcome, Side};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn spawn(h: Harness) -> (market_cycle::engine::CycleHandle, tokio::task::JoinHandle<()>) {
    let (runtime, handle) = CycleRuntime::new(h.engine);
    (handle, runtime.spawn())
}

#[tokio::test(start_paused = true)]
async fn test_runtime_ticks_once_per_second() {
    let h = Harness::new(durations(3, 4, 2), 1);
    let broadcaster = h.broadcaster.clone();
    let (handle, task) = spawn(h);

    handle.start_cycle().await.unwrap();
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Betting);
    assert!(status.can_place_bet);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Betting);
    assert_eq!(status.betting_remaining, 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Game);
    assert!(!status.can_place_bet);

    // 4s game, 1s grace, 2s interval.
    tokio::time::sleep(Duration::from_secs(7)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Betting);
    assert_eq!(status.betting_remaining, 3);

    assert_eq!(
        broadcaster.phases(),
        vec![Phase::Betting, Phase::Game, Phase::Processing, Phase::Interval, Phase::Betting]
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert_eq!(handle.status().await, Err(CycleError::EngineGone));
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_ticking() {
    let h = Harness::new(durations(3, 4, 2), 1);
    let broadcaster = h.broadcaster.clone();
    let (handle, _task) = spawn(h);

    handle.start_cycle().await.unwrap();
    assert_eq!(handle.start_cycle().await, Err(CycleError::AlreadyRunning));
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    handle.stop_cycle().await.unwrap();

    let count = broadcaster.status_count();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(broadcaster.status_count(), count);
    assert_eq!(handle.status().await.unwrap().phase, Phase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_feed_events_reach_the_engine() {
    let h = Harness::new(durations(5, 5, 2), 1);
    let feed = h.feed.clone();
    let (handle, _task) = spawn(h);

    handle.start_cycle().await.unwrap();
    let market = handle.status().await.unwrap().market_id.unwrap();
    let route = feed.route(CHANNEL_A).unwrap();
    assert!(route.deliver(payload("goal")).await);
    assert!(route.deliver(payload("throw_in")).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    match handle.market_events(&market).await.unwrap() {
        MarketEvents::Live(events) => {
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].vendor_type, "goal");
        }
        other => panic!("expected live events, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_relay_does_not_hold_the_clock() {
    let relay = Arc::new(SlowRelay::new(Duration::from_secs(4)));
    let h = Harness::with_relay(durations(3, 60, 10), 1, relay.clone());
    let feed = h.feed.clone();
    let (handle, _task) = spawn(h);

    handle.start_cycle().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let route = feed.route(CHANNEL_A).unwrap();
    for _ in 0..3 {
        assert!(route.deliver(payload("goal")).await);
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Game);
    assert_eq!(status.game_remaining, 60);
    let market = status.market_id.unwrap();
    assert_eq!(handle.market_events(&market).await.unwrap().len(), 3);
    assert!(relay.relayed.load(Ordering::SeqCst) < 3);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(relay.relayed.load(Ordering::SeqCst), 3);
    assert_eq!(handle.status().await.unwrap().game_remaining, 50);
}

#[tokio::test(start_paused = true)]
async fn test_events_before_game_end_belong_to_the_market() {
    let relay = Arc::new(SlowRelay::new(Duration::from_secs(1)));
    let h = Harness::with_relay(durations(1, 3, 10), 1, relay);
    let feed = h.feed.clone();
    let ledger = h.ledger.clone();
    let (handle, _task) = spawn(h);

    handle.start_cycle().await.unwrap();
    let market = handle.status().await.unwrap().market_id.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(handle.status().await.unwrap().phase, Phase::Game);

    let route = feed.route(CHANNEL_A).unwrap();
    for _ in 0..30 {
        assert!(route.deliver(payload("goal")).await);
    }

    // Game ends at t=4.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.status().await.unwrap().phase, Phase::Processing);
    let result = ledger.result(&market).expect("result persisted");
    assert_eq!(result.total_events, 30);
    assert_eq!(result.count(Outcome::Goal, Side::A), 30);
}

#[tokio::test(start_paused = true)]
async fn test_single_window_from_handle() {
    let h = Harness::new(durations(2, 2, 2), 1);
    let (handle, _task) = spawn(h);

    handle.open_betting().await.unwrap();
    assert_eq!(handle.open_betting().await, Err(CycleError::AlreadyOpen));

    tokio::time::sleep(Duration::from_millis(7_500)).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Stopped);
    assert!(!status.automatic);
}
