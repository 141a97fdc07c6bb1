//! Engine error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input backend is not ready")]
    BackendUnavailable,

    #[error("unknown key name: {0}")]
    UnknownKey(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("no hotkey registered")]
    NoHotkey,

    #[error("target window gate refused execution: {0}")]
    GateBlocked(String),

    #[error("a session is already running")]
    AlreadyRunning,

    #[error("worker {name} did not stop within {timeout_ms}ms")]
    StopTimeout { name: String, timeout_ms: u64 },

    #[error("worker pool at capacity")]
    PoolExhausted,
}

pub type Result<T> = std::result::Result<T, EngineError>;
