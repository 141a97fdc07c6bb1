use std::sync::Arc;
use std::time::Instant;

use crate::error::{EngineError, Result};
use crate::keys::{self, KeyCode, Modifiers};

/// One step of a replayed action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Press and release a key or mouse button, then wait `interval_ms`.
    Key { code: KeyCode, interval_ms: u64 },
    /// Move the cursor to an absolute position and click, then wait.
    Coord { x: i32, y: i32, interval_ms: u64 },
}

impl Action {
    pub fn interval_ms(&self) -> u64 {
        match self {
            Action::Key { interval_ms, .. } | Action::Coord { interval_ms, .. } => *interval_ms,
        }
    }

    /// Rejects steps that would misbehave at replay time. (0, 0) is the
    /// uninitialized-coordinate sentinel and is never a valid click target.
    pub fn validate(&self) -> Result<()> {
        match self {
            Action::Key { code, .. } => {
                if *code == 0 {
                    return Err(EngineError::InvalidAction("key code 0".to_string()));
                }
                Ok(())
            }
            Action::Coord { x: 0, y: 0, .. } => Err(EngineError::InvalidAction(
                "coordinate (0, 0) is reserved".to_string(),
            )),
            Action::Coord { x, y, .. } if *x < 0 || *y < 0 => Err(EngineError::InvalidAction(
                format!("negative coordinate ({x}, {y})"),
            )),
            Action::Coord { .. } => Ok(()),
        }
    }
}

/// Immutable copy of the action list taken when a session starts. Edits to
/// the live list never affect a session already running.
pub type ActionSnapshot = Arc<[Action]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Toggle: one press starts the looped replay, the next stops it.
    Sequence,
    /// Press-and-hold: replay runs only while the hotkey is held.
    Hold,
}

impl Mode {
    #[inline(always)]
    pub const fn to_u8(self) -> u8 {
        match self {
            Mode::Sequence => 0,
            Mode::Hold => 1,
        }
    }

    #[inline(always)]
    pub const fn from_u8(value: u8) -> Mode {
        match value {
            1 => Mode::Hold,
            _ => Mode::Sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// The trigger binding. A single binding both starts and stops a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl HotkeyBinding {
    pub fn parse(name: &str) -> Result<HotkeyBinding> {
        let (code, modifiers) =
            keys::parse_binding(name).ok_or_else(|| EngineError::UnknownKey(name.to_string()))?;
        Ok(HotkeyBinding { code, modifiers })
    }
}

/// Per-key burst parameters for the rapid-fire subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RapidFireConfig {
    /// How long each press is held down.
    pub press_ms: u64,
    /// Gap between the release and the next press.
    pub burst_delay_ms: u64,
}

/// A raw key or button transition as reported by the capture layer.
#[derive(Debug, Clone, Copy)]
pub struct RawInput {
    pub code: KeyCode,
    pub is_down: bool,
    pub modifiers: Modifiers,
    pub timestamp: Instant,
}

/// Observable engine events, delivered over the subscription channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    SessionStarted(Mode),
    SessionStopped,
    ModeSwitched(Mode),
    Status { text: String, is_error: bool },
}
