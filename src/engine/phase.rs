use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BETTING_SECS: u32 = 10;
pub const DEFAULT_GAME_SECS: u32 = 60;
pub const DEFAULT_INTERVAL_SECS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Stopped,
    Betting,
    Game,
    Processing,
    Interval,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Stopped => "stopped",
            Phase::Betting => "betting",
            Phase::Game => "game",
            Phase::Processing => "processing",
            Phase::Interval => "interval",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDurations {
    pub betting_secs: u32,
    pub game_secs: u32,
    pub interval_secs: u32,
}

impl Default for PhaseDurations {
    fn default() -> Self {
        Self {
            betting_secs: DEFAULT_BETTING_SECS,
            game_secs: DEFAULT_GAME_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl PhaseDurations {
    /// Fill zero fields from `previous`. Loaded documents may omit a field.
    pub fn or(self, previous: PhaseDurations) -> PhaseDurations {
        PhaseDurations {
            betting_secs: nonzero_or(self.betting_secs, previous.betting_secs),
            game_secs: nonzero_or(self.game_secs, previous.game_secs),
            interval_secs: nonzero_or(self.interval_secs, previous.interval_secs),
        }
    }

    /// A zero-length phase would never expire; replace zeros with defaults.
    pub fn sanitized(self) -> PhaseDurations {
        self.or(PhaseDurations::default())
    }
}

fn nonzero_or(value: u32, fallback: u32) -> u32 {
    if value == 0 {
        fallback
    } else {
        value
    }
}

/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing is counting in this phase.
    Idle,
    Running,
    /// The counter just reached zero.
    Expired,
}

/// One remaining-seconds slot per timed phase. `grace` counts the settle
/// window that follows `Processing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    pub betting: u32,
    pub game: u32,
    pub grace: u32,
    pub interval: u32,
}

impl Countdown {
    pub fn step(&mut self, phase: Phase) -> Step {
        let slot = match phase {
            Phase::Betting => &mut self.betting,
            Phase::Game => &mut self.game,
            Phase::Processing => &mut self.grace,
            Phase::Interval => &mut self.interval,
            Phase::Stopped => return Step::Idle,
        };
        if *slot == 0 {
            return Step::Idle;
        }
        *slot -= 1;
        if *slot == 0 {
            Step::Expired
        } else {
            Step::Running
        }
    }
}

/// Owned snapshot of the engine state, safe to hand to any collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatus {
    pub phase: Phase,
    pub automatic: bool,
    pub betting_open: bool,
    /// Whether a wager placed now would be accepted.
    pub can_place_bet: bool,
    pub betting_remaining: u32,
    pub game_remaining: u32,
    pub interval_remaining: u32,
    pub market_id: Option<String>,
    pub durations: PhaseDurations,
}

impl CycleStatus {
    /// Seconds left in whichever phase is currently counting.
    pub fn remaining(&self) -> u32 {
        match self.phase {
            Phase::Betting => self.betting_remaining,
            Phase::Game => self.game_remaining,
            Phase::Interval => self.interval_remaining,
            Phase::Stopped | Phase::Processing => 0,
        }
    }

    /// True at the first and last second of a phase, and while processing.
    pub fn is_boundary(&self) -> bool {
        match self.phase {
            Phase::Betting => {
                self.betting_remaining == self.durations.betting_secs || self.betting_remaining == 0
            }
            Phase::Game => {
                self.game_remaining == self.durations.game_secs || self.game_remaining == 0
            }
            Phase::Interval => {
                self.interval_remaining == self.durations.interval_secs
                    || self.interval_remaining == 0
            }
            Phase::Stopped | Phase::Processing => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_counts_down_and_expires() {
        let mut c = Countdown {
            betting: 2,
            ..Default::default()
        };
        assert_eq!(c.step(Phase::Betting), Step::Running);
        assert_eq!(c.betting, 1);
        assert_eq!(c.step(Phase::Betting), Step::Expired);
        assert_eq!(c.betting, 0);
        assert_eq!(c.step(Phase::Betting), Step::Idle);
    }

    #[test]
    fn test_step_only_touches_current_phase() {
        let mut c = Countdown {
            betting: 5,
            game: 5,
            grace: 5,
            interval: 5,
        };
        c.step(Phase::Game);
        assert_eq!(c, Countdown { betting: 5, game: 4, grace: 5, interval: 5 });
        c.step(Phase::Processing);
        assert_eq!(c.grace, 4);
    }

    #[test]
    fn test_stopped_is_idle() {
        let mut c = Countdown {
            betting: 3,
            ..Default::default()
        };
        assert_eq!(c.step(Phase::Stopped), Step::Idle);
        assert_eq!(c.betting, 3);
    }

    #[test]
    fn test_durations_keep_previous_for_missing_fields() {
        let previous = PhaseDurations {
            betting_secs: 15,
            game_secs: 90,
            interval_secs: 5,
        };
        let loaded = PhaseDurations {
            betting_secs: 20,
            game_secs: 0,
            interval_secs: 0,
        };
        assert_eq!(
            loaded.or(previous),
            PhaseDurations {
                betting_secs: 20,
                game_secs: 90,
                interval_secs: 5
            }
        );
    }

    #[test]
    fn test_sanitized_replaces_zero_with_defaults() {
        let d = PhaseDurations {
            betting_secs: 0,
            game_secs: 30,
            interval_secs: 0,
        }
        .sanitized();
        assert_eq!(d.betting_secs, DEFAULT_BETTING_SECS);
        assert_eq!(d.game_secs, 30);
        assert_eq!(d.interval_secs, DEFAULT_INTERVAL_SECS);
    }

    #[test]
    fn test_status_remaining_follows_phase() {
        let status = CycleStatus {
            phase: Phase::Game,
            automatic: true,
            betting_open: false,
            can_place_bet: false,
            betting_remaining: 0,
            game_remaining: 42,
            interval_remaining: 0,
            market_id: None,
            durations: PhaseDurations::default(),
        };
        assert_eq!(status.remaining(), 42);
        assert!(!status.is_boundary());
    }
}
