//! Random vendor events for running the cycle without a live feed.

use super::normalizer::known_vendor_types;
use super::{FeedRoute, FeedSubscription, LiveFeed};
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct SimulatedFeed {
    mean_interval: Duration,
    seed: Option<u64>,
}

impl SimulatedFeed {
    pub fn new(mean_interval: Duration, seed: Option<u64>) -> Self {
        Self {
            mean_interval,
            seed,
        }
    }

    fn rng_for(&self, channel: &str) -> StdRng {
        match self.seed {
            // Same seed, different channel => different but reproducible stream.
            Some(seed) => {
                let salt = channel
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
                StdRng::seed_from_u64(seed ^ salt)
            }
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl LiveFeed for SimulatedFeed {
    async fn subscribe(&self, channel: &str, route: FeedRoute) -> Result<Box<dyn FeedSubscription>> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let generator = EventGenerator {
            rng: self.rng_for(channel),
            mean_interval: self.mean_interval,
            match_time: 0,
            home_score: 0,
            away_score: 0,
        };
        let handle = tokio::spawn(generator.run(route, shutdown_rx));
        tracing::debug!(channel, "simulated feed subscribed");
        Ok(Box::new(SimSubscription {
            channel: channel.to_string(),
            shutdown: Some(shutdown_tx),
            handle,
        }))
    }
}

struct SimSubscription {
    channel: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

#[async_trait]
impl FeedSubscription for SimSubscription {
    async fn unsubscribe(mut self: Box<Self>) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(TEARDOWN_TIMEOUT, &mut self.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!(e).context(format!("simulated feed for {} failed", self.channel))),
            Err(_) => {
                self.handle.abort();
                anyhow::bail!("teardown of {} timed out, generator aborted", self.channel)
            }
        }
    }
}

struct EventGenerator {
    rng: StdRng,
    mean_interval: Duration,
    match_time: u32,
    home_score: u32,
    away_score: u32,
}

impl EventGenerator {
    async fn run(mut self, route: FeedRoute, mut shutdown: oneshot::Receiver<()>) {
        loop {
            let wait = self.mean_interval.mul_f64(self.rng.gen_range(0.5..1.5));
            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(wait) => {}
            }
            let payload = self.next_payload();
            // Blocked sends still observe shutdown.
            tokio::select! {
                _ = &mut shutdown => return,
                delivered = route.deliver(payload) => {
                    if !delivered {
                        return;
                    }
                }
            }
        }
    }

    fn next_payload(&mut self) -> String {
        let types: Vec<&str> = known_vendor_types().collect();
        let event_type = types[self.rng.gen_range(0..types.len())];
        let home = self.rng.gen_bool(0.5);
        if event_type == "goal" {
            if home {
                self.home_score += 1;
            } else {
                self.away_score += 1;
            }
        }
        self.match_time += self.rng.gen_range(0..3);

        serde_json::json!({
            "event": {
                "type": event_type,
                "time": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "match_time": self.match_time,
                "match_clock": format!("{}:{:02}", self.match_time, self.rng.gen_range(0..60)),
                "competitor": if home { "home" } else { "away" },
                "period": if self.match_time < 45 { 1 } else { 2 },
                "x": self.rng.gen_range(0.0..100.0),
                "y": self.rng.gen_range(0.0..100.0),
            },
            "sport_event_status": {
                "status": "live",
                "match_status": if self.match_time < 45 { "1st_half" } else { "2nd_half" },
                "home_score": self.home_score,
                "away_score": self.away_score,
            }
        })
        .to_string()
    }
}
