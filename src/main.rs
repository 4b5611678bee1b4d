use anyhow::{Context, Result};
use market_cycle::admin::auth::RelaySigner;
use market_cycle::admin::rest::AdminRest;
use market_cycle::admin::{EventRelay, SettingsSource, StaticSettings};
use market_cycle::config::Config;
use market_cycle::engine::{
    Broadcaster, Collaborators, CycleHandle, CycleRuntime, MarketCycleEngine, SharedBetBook,
    TracingBroadcaster,
};
use market_cycle::error::CycleError;
use market_cycle::feed::games::ActiveGameRoster;
use market_cycle::feed::ingestion::EventIngestionService;
use market_cycle::feed::simulated::SimulatedFeed;
use market_cycle::feed::ws::WsLiveFeed;
use market_cycle::feed::LiveFeed;
use market_cycle::ledger::MemoryLedger;
use market_cycle::tui::{self, state::AppState, TuiBroadcaster, TuiCommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "market-cycle.log";
const DEFAULT_FILTER: &str = "market_cycle=info";

struct Args {
    simulate: bool,
    headless: bool,
    config_path: PathBuf,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args {
            simulate: false,
            headless: false,
            config_path: PathBuf::from("config.toml"),
        };
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--simulate" => args.simulate = true,
                "--headless" => args.headless = true,
                "--config" => {
                    let path = iter.next().context("--config needs a path")?;
                    args.config_path = PathBuf::from(path);
                }
                other => anyhow::bail!("unknown argument: {}", other),
            }
        }
        Ok(args)
    }
}

fn init_tracing(headless: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if headless {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        // The terminal belongs to the console.
        let log_file = std::fs::File::create(LOG_FILE)
            .with_context(|| format!("Failed to create log file: {}", LOG_FILE))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(log_file)
            .init();
    }
    Ok(())
}

fn build_admin(config: &Config) -> Result<Option<Arc<AdminRest>>> {
    let Some(admin) = &config.admin else {
        return Ok(None);
    };
    let signer = match Config::admin_credentials() {
        Some((key, secret)) => Some(Arc::new(RelaySigner::new(key, &secret))),
        None => {
            tracing::warn!("ADMIN_API_KEY / ADMIN_API_SECRET not set, admin requests are unsigned");
            None
        }
    };
    let rest = AdminRest::new(
        &admin.base_url,
        signer,
        Duration::from_millis(admin.request_timeout_ms),
    )?;
    Ok(Some(Arc::new(rest)))
}

/// Replace the roster from the admin API every `period`.
fn spawn_roster_refresh(
    admin: Arc<AdminRest>,
    roster: ActiveGameRoster,
    state_tx: watch::Sender<AppState>,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match admin.get_active_games().await {
                Ok(games) => {
                    roster.replace(games);
                    let count = roster.len();
                    state_tx.send_modify(|s| s.active_games = count);
                }
                Err(e) => tracing::warn!("failed to refresh active games: {:#}", e),
            }
        }
    });
}

async fn forward_commands(
    mut cmd_rx: mpsc::Receiver<TuiCommand>,
    handle: CycleHandle,
    state_tx: watch::Sender<AppState>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let outcome = match cmd {
            TuiCommand::Start => handle.start_cycle().await,
            TuiCommand::Stop => handle.stop_cycle().await,
            TuiCommand::OpenBetting => handle.open_betting().await,
            TuiCommand::MarketSummary => show_market(&handle, &state_tx).await,
            TuiCommand::Quit => return,
        };
        if let Err(e) = outcome {
            tracing::warn!(?cmd, "command rejected: {}", e);
            state_tx.send_modify(|s| s.push_log("WARN", format!("{:?}: {}", cmd, e)));
        }
    }
}

async fn show_market(handle: &CycleHandle, state_tx: &watch::Sender<AppState>) -> Result<(), CycleError> {
    let Some(market_id) = handle.status().await?.market_id else {
        state_tx.send_modify(|s| s.push_log("INFO", "no market".to_string()));
        return Ok(());
    };
    let events = handle.market_events(&market_id).await?;
    state_tx.send_modify(|s| s.push_market_summary(&market_id, &events));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;
    init_tracing(args.headless)?;

    let config = Config::load(&args.config_path)?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();

    let admin = build_admin(&config)?;

    let roster = ActiveGameRoster::new(config.active_games());

    let (state_tx, state_rx) = watch::channel({
        let mut s = AppState::new();
        s.simulated = args.simulate;
        s.status.durations = config.cycle.durations();
        s
    });

    if let Some(admin) = &admin {
        if let Some(cfg) = &config.admin {
            spawn_roster_refresh(
                admin.clone(),
                roster.clone(),
                state_tx.clone(),
                Duration::from_secs(cfg.roster_refresh_s.max(1)),
            );
        }
    }
    let game_count = roster.len();
    state_tx.send_modify(|s| s.active_games = game_count);

    let feed: Arc<dyn LiveFeed> = if args.simulate {
        Arc::new(SimulatedFeed::new(
            Duration::from_millis(config.simulation.mean_event_interval_ms),
            config.simulation.seed,
        ))
    } else {
        Arc::new(WsLiveFeed::new(
            &config.feed.ws_url,
            config.feed.reconnect_delay(),
            config.feed.unsubscribe_timeout(),
        ))
    };

    let broadcaster: Arc<dyn Broadcaster> = if args.headless {
        Arc::new(TracingBroadcaster)
    } else {
        Arc::new(TuiBroadcaster::new(state_tx.clone()))
    };

    let relay: Option<Arc<dyn EventRelay>> = admin.clone().map(|a| a as Arc<dyn EventRelay>);
    let settings: Arc<dyn SettingsSource> = match &admin {
        Some(a) => a.clone(),
        None => Arc::new(StaticSettings(Some(config.cycle.durations()))),
    };

    let ingestion = EventIngestionService::new(
        feed,
        broadcaster.clone(),
        Arc::new(SharedBetBook::new()),
        relay,
        config.feed.channel_capacity,
    );

    let engine = MarketCycleEngine::new(
        config.cycle.durations(),
        config.cycle.processing_grace_secs,
        Collaborators {
            ledger: Arc::new(MemoryLedger::with_retention(config.cycle.retained_markets)),
            broadcaster,
            settings,
            games: Arc::new(roster.clone()),
        },
        ingestion,
    );
    let (runtime, handle) = CycleRuntime::new(engine);
    let engine_task = runtime.spawn();

    tracing::info!(
        simulate = args.simulate,
        headless = args.headless,
        games = game_count,
        "market cycle started"
    );

    if config.cycle.auto_start {
        if let Err(e) = handle.start_cycle().await {
            tracing::warn!("auto start failed: {}", e);
        }
    }

    if args.headless {
        if !config.cycle.auto_start {
            handle.start_cycle().await?;
        }
        tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
        tracing::info!("ctrl-c received");
    } else {
        let (cmd_tx, cmd_rx) = mpsc::channel::<TuiCommand>(16);
        tokio::spawn(forward_commands(cmd_rx, handle.clone(), state_tx.clone()));
        tui::run_tui(state_rx, cmd_tx).await?;
    }

    let _ = handle.shutdown().await;
    let _ = engine_task.await;
    tracing::debug!("shutting down");
    Ok(())
}
