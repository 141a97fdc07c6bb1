//! keyrelay - hotkey-triggered input replay engine.
//!
//! A single configurable hotkey toggles (or, in hold mode, gates) the
//! looped replay of an action list of key presses and coordinate clicks.
//! Sessions can be bound to a target window so replay stops the moment
//! that window loses focus, and individual keys can be put on independent
//! rapid-fire burst loops instead.
//!
//! The engine core is platform neutral; Windows supplies the `SendInput`
//! backend and the low-level capture hooks.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod keys;
pub mod throttle;

#[cfg(windows)]
pub mod hook;

pub use engine::{Action, Engine, EngineEvent, HotkeyBinding, Mode, RapidFireConfig, SessionState};
pub use error::{EngineError, Result};
pub use gate::{GateStatus, WindowGate, WindowTarget};
