use crate::engine::phase::Phase;

/// Caller misuse of the cycle engine. Returned, never panicked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("automatic cycle is already running")]
    AlreadyRunning,

    #[error("betting window is already open")]
    AlreadyOpen,

    #[error("betting window is not open")]
    NotOpen,

    #[error("cannot open betting while the current market is in {0} phase")]
    Busy(Phase),

    #[error("cycle engine is no longer running")]
    EngineGone,
}

/// Inbound live-feed message that cannot be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed feed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("feed message carries no event type")]
    MissingType,
}
