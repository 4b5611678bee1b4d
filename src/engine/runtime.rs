use super::cycle::{MarketCycleEngine, MarketEvents};
use super::phase::CycleStatus;
use crate::error::CycleError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);
const COMMAND_CAPACITY: usize = 32;

pub enum EngineCommand {
    StartCycle(oneshot::Sender<Result<(), CycleError>>),
    StopCycle(oneshot::Sender<()>),
    OpenBetting(oneshot::Sender<Result<(), CycleError>>),
    Status(oneshot::Sender<CycleStatus>),
    MarketEvents(String, oneshot::Sender<MarketEvents>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front door to the engine actor.
#[derive(Clone)]
pub struct CycleHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl CycleHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, CycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CycleError::EngineGone)?;
        reply_rx.await.map_err(|_| CycleError::EngineGone)
    }

    pub async fn start_cycle(&self) -> Result<(), CycleError> {
        self.request(EngineCommand::StartCycle).await?
    }

    pub async fn stop_cycle(&self) -> Result<(), CycleError> {
        self.request(EngineCommand::StopCycle).await
    }

    /// Open a single betting window without starting the automatic loop.
    pub async fn open_betting(&self) -> Result<(), CycleError> {
        self.request(EngineCommand::OpenBetting).await?
    }

    pub async fn status(&self) -> Result<CycleStatus, CycleError> {
        self.request(EngineCommand::Status).await
    }

    pub async fn market_events(&self, market_id: &str) -> Result<MarketEvents, CycleError> {
        let market_id = market_id.to_string();
        self.request(|tx| EngineCommand::MarketEvents(market_id, tx)).await
    }

    pub async fn shutdown(&self) -> Result<(), CycleError> {
        self.request(EngineCommand::Shutdown).await
    }
}

/// Actor that owns the engine. All state changes happen on this task.
pub struct CycleRuntime {
    engine: MarketCycleEngine,
    commands: mpsc::Receiver<EngineCommand>,
}

impl CycleRuntime {
    pub fn new(engine: MarketCycleEngine) -> (Self, CycleHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let runtime = Self { engine, commands };
        (runtime, CycleHandle { tx })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut ticker: Option<Interval> = None;

        loop {
            sync_ticker(&mut ticker, self.engine.is_ticking());

            tokio::select! {
                _ = next_tick(&mut ticker) => self.engine.tick().await,
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd).await {
                        return;
                    }
                }
                Some(envelope) = self.engine.next_envelope() => self.engine.ingest(envelope).await,
            }
        }

        // Every handle dropped.
        self.engine.shutdown().await;
    }

    /// Returns false when the actor should exit.
    async fn handle(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::StartCycle(reply) => {
                let _ = reply.send(self.engine.start_automatic_cycle().await);
            }
            EngineCommand::StopCycle(reply) => {
                self.engine.stop_automatic_cycle().await;
                let _ = reply.send(());
            }
            EngineCommand::OpenBetting(reply) => {
                let _ = reply.send(self.engine.enter_betting().await);
            }
            EngineCommand::Status(reply) => {
                let _ = reply.send(self.engine.status());
            }
            EngineCommand::MarketEvents(market_id, reply) => {
                let _ = reply.send(self.engine.market_events(&market_id).await);
            }
            EngineCommand::Shutdown(reply) => {
                self.engine.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Keep an interval only while the engine is ticking. A fresh interval
/// first fires one full second after it is created.
fn sync_ticker(ticker: &mut Option<Interval>, ticking: bool) {
    match (ticking, ticker.is_some()) {
        (true, false) => {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK, TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
        }
        (false, true) => *ticker = None,
        _ => {}
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
