pub mod render;
pub mod state;

use crate::engine::phase::CycleStatus;
use crate::engine::Broadcaster;
use crate::feed::types::NormalizedEvent;
use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use state::AppState;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Commands the console sends back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiCommand {
    Start,
    Stop,
    OpenBetting,
    /// Log what the current market has collected or settled.
    MarketSummary,
    Quit,
}

/// Broadcaster that feeds the console state.
pub struct TuiBroadcaster {
    state_tx: watch::Sender<AppState>,
}

impl TuiBroadcaster {
    pub fn new(state_tx: watch::Sender<AppState>) -> Self {
        Self { state_tx }
    }
}

#[async_trait]
impl Broadcaster for TuiBroadcaster {
    async fn publish_status(&self, status: &CycleStatus) -> Result<()> {
        self.state_tx.send_modify(|s| s.apply_status(status));
        Ok(())
    }

    async fn publish_event(&self, event: &NormalizedEvent) -> Result<()> {
        self.state_tx.send_modify(|s| s.push_event(event));
        Ok(())
    }
}

/// Run the console. Reads state from `state_rx`, sends commands on `cmd_tx`.
pub async fn run_tui(state_rx: watch::Receiver<AppState>, cmd_tx: mpsc::Sender<TuiCommand>) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = tui_loop(&mut terminal, state_rx, cmd_tx).await;

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut state_rx: watch::Receiver<AppState>,
    cmd_tx: mpsc::Sender<TuiCommand>,
) -> Result<()> {
    let mut log_focus = false;
    let mut log_scroll: usize = 0;

    loop {
        let mut state = state_rx.borrow().clone();
        state.log_focus = log_focus;
        state.log_scroll_offset = log_scroll;
        terminal.draw(|f| render::draw(f, &state))?;

        // Poll for keyboard events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let cmd = match key.code {
                        KeyCode::Char('q') => {
                            let _ = cmd_tx.send(TuiCommand::Quit).await;
                            return Ok(());
                        }
                        KeyCode::Char('s') => Some(TuiCommand::Start),
                        KeyCode::Char('x') => Some(TuiCommand::Stop),
                        KeyCode::Char('o') => Some(TuiCommand::OpenBetting),
                        KeyCode::Char('m') => Some(TuiCommand::MarketSummary),
                        KeyCode::Char('l') => {
                            log_focus = !log_focus;
                            log_scroll = 0;
                            None
                        }
                        KeyCode::Esc => {
                            log_focus = false;
                            None
                        }
                        KeyCode::Char('k') if log_focus => {
                            log_scroll = log_scroll.saturating_add(1);
                            None
                        }
                        KeyCode::Char('j') if log_focus => {
                            log_scroll = log_scroll.saturating_sub(1);
                            None
                        }
                        _ => None,
                    };
                    if let Some(cmd) = cmd {
                        let _ = cmd_tx.send(cmd).await;
                    }
                    continue;
                }
            }
        }

        // Redraw on state change, or at least a few times per second.
        let _ = tokio::time::timeout(Duration::from_millis(250), state_rx.changed()).await;
    }
}
