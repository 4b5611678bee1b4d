use super::types::{ActiveGame, Side};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// Source of the games currently assigned to sides. Queried at every point
/// of use, never cached by the engine.
pub trait ActiveGamesProvider: Send + Sync {
    fn list_active_games(&self) -> Vec<ActiveGame>;
}

/// Shared, replaceable list of active games.
#[derive(Clone, Default)]
pub struct ActiveGameRoster {
    games: Arc<Mutex<Vec<ActiveGame>>>,
}

impl ActiveGameRoster {
    pub fn new(games: Vec<ActiveGame>) -> Self {
        Self {
            games: Arc::new(Mutex::new(games)),
        }
    }

    pub fn replace(&self, games: Vec<ActiveGame>) {
        if let Ok(mut current) = self.games.lock() {
            tracing::info!(count = games.len(), "active games replaced");
            *current = games;
        }
    }

    pub fn len(&self) -> usize {
        self.games.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActiveGamesProvider for ActiveGameRoster {
    fn list_active_games(&self) -> Vec<ActiveGame> {
        self.games.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

// ── Active-games wire format ─────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum ActiveGamesDocument {
    Wrapped {
        #[serde(rename = "activeGames")]
        active_games: Vec<WireGame>,
    },
    Bare(Vec<WireGame>),
}

#[derive(Deserialize)]
struct WireGame {
    id: String,
    #[serde(default)]
    side: Option<Side>,
    home: WireTeam,
    away: WireTeam,
}

#[derive(Deserialize)]
struct WireTeam {
    name: String,
}

/// Parse an active-games document. Accepts
/// `{"type":"active-games","activeGames":[...]}`, `{"activeGames":[...]}`,
/// or a bare array.
pub fn parse_active_games(json: &str) -> Result<Vec<ActiveGame>> {
    let doc: ActiveGamesDocument =
        serde_json::from_str(json).context("failed to parse active games document")?;
    let wire = match doc {
        ActiveGamesDocument::Wrapped { active_games } => active_games,
        ActiveGamesDocument::Bare(games) => games,
    };
    Ok(wire
        .into_iter()
        .map(|g| ActiveGame {
            id: g.id,
            side: g.side,
            home_name: g.home.name,
            away_name: g.away.name,
        })
        .collect())
}
