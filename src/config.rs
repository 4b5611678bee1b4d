use crate::engine::cycle::DEFAULT_PROCESSING_GRACE_SECS;
use crate::engine::phase::{PhaseDurations, DEFAULT_BETTING_SECS, DEFAULT_GAME_SECS, DEFAULT_INTERVAL_SECS};
use crate::feed::types::{ActiveGame, Side};
use crate::ledger::memory::DEFAULT_RETAINED_MARKETS;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub admin: Option<AdminConfig>,
    #[serde(default)]
    pub games: Vec<GameConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CycleConfig {
    #[serde(default = "default_betting_secs")]
    pub betting_secs: u32,
    #[serde(default = "default_game_secs")]
    pub game_secs: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,
    #[serde(default = "default_grace_secs")]
    pub processing_grace_secs: u32,
    #[serde(default)]
    pub auto_start: bool,
    /// Markets the in-memory ledger keeps before dropping the oldest.
    #[serde(default = "default_retained_markets")]
    pub retained_markets: usize,
}

fn default_betting_secs() -> u32 { DEFAULT_BETTING_SECS }
fn default_game_secs() -> u32 { DEFAULT_GAME_SECS }
fn default_interval_secs() -> u32 { DEFAULT_INTERVAL_SECS }
fn default_grace_secs() -> u32 { DEFAULT_PROCESSING_GRACE_SECS }
fn default_retained_markets() -> usize { DEFAULT_RETAINED_MARKETS }

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            betting_secs: DEFAULT_BETTING_SECS,
            game_secs: DEFAULT_GAME_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            processing_grace_secs: DEFAULT_PROCESSING_GRACE_SECS,
            auto_start: false,
            retained_markets: DEFAULT_RETAINED_MARKETS,
        }
    }
}

impl CycleConfig {
    /// Configured durations; zeros fall back to the defaults.
    pub fn durations(&self) -> PhaseDurations {
        PhaseDurations {
            betting_secs: self.betting_secs,
            game_secs: self.game_secs,
            interval_secs: self.interval_secs,
        }
        .sanitized()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_s: u64,
    #[serde(default = "default_unsubscribe_timeout")]
    pub unsubscribe_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_ws_url() -> String { "ws://127.0.0.1:8090/live".to_string() }
fn default_reconnect_delay() -> u64 { 5 }
fn default_unsubscribe_timeout() -> u64 { 2000 }
fn default_channel_capacity() -> usize { crate::feed::ingestion::DEFAULT_CHANNEL_CAPACITY }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_delay_s: default_reconnect_delay(),
            unsubscribe_timeout_ms: default_unsubscribe_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_s)
    }

    pub fn unsubscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.unsubscribe_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_mean_event_interval")]
    pub mean_event_interval_ms: u64,
    pub seed: Option<u64>,
}

fn default_mean_event_interval() -> u64 { 4000 }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mean_event_interval_ms: default_mean_event_interval(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub base_url: String,
    #[serde(default = "default_admin_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_roster_refresh")]
    pub roster_refresh_s: u64,
}

fn default_admin_timeout() -> u64 { 5000 }
fn default_roster_refresh() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    pub id: String,
    pub side: Option<Side>,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub away: String,
}

impl GameConfig {
    pub fn to_active_game(&self) -> ActiveGame {
        ActiveGame {
            id: self.id.clone(),
            side: self.side,
            home_name: self.home.clone(),
            away_name: self.away.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    pub fn active_games(&self) -> Vec<ActiveGame> {
        self.games.iter().map(GameConfig::to_active_game).collect()
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for (key, value) in parse_env(content) {
            if std::env::var(&key).is_err() {
                std::env::set_var(key, value);
            }
        }
    }

    /// Admin API key and signing secret, when both are set.
    pub fn admin_credentials() -> Option<(String, String)> {
        let key = std::env::var("ADMIN_API_KEY").ok().map(|k| sanitize_key(&k))?;
        let secret = std::env::var("ADMIN_API_SECRET").ok().map(|s| sanitize_key(&s))?;
        if key.is_empty() || secret.is_empty() {
            return None;
        }
        Some((key, secret))
    }
}

fn parse_env(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(|line| line.trim().trim_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Strip carriage returns, BOM, and other invisible chars from a key value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
