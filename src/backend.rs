//! Input injection abstraction.
//!
//! Executors drive a [`InputBackend`] trait object so the engine core stays
//! platform neutral. The OS implementation lives in [`sendinput`]; tests use
//! [`RecordingBackend`].

use std::sync::Mutex;
use std::time::Instant;

use crate::keys::{self, KeyCode};

#[cfg(windows)]
pub mod sendinput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl MouseButton {
    /// Maps a mouse button virtual key code to its button, if it is one.
    pub fn from_code(code: KeyCode) -> Option<MouseButton> {
        match code {
            keys::VK_LBUTTON => Some(MouseButton::Left),
            keys::VK_RBUTTON => Some(MouseButton::Right),
            keys::VK_MBUTTON => Some(MouseButton::Middle),
            keys::VK_XBUTTON1 => Some(MouseButton::X1),
            keys::VK_XBUTTON2 => Some(MouseButton::X2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

/// Low-level input injection. Every method reports success with a bool and
/// must never panic; a failed injection is logged by the caller and the
/// executor keeps going.
pub trait InputBackend: Send + Sync {
    fn key_down(&self, code: KeyCode) -> bool;
    fn key_up(&self, code: KeyCode) -> bool;
    fn mouse_button(&self, button: MouseButton, down: bool) -> bool;
    fn mouse_move_abs(&self, x: i32, y: i32) -> bool;
    fn mouse_wheel(&self, direction: WheelDirection, amount: i32) -> bool;
    fn is_ready(&self) -> bool;
}

/// Presses a code, dispatching mouse buttons and wheel gestures to the
/// matching backend call. Wheel gestures are instantaneous, so pressing one
/// emits the full gesture and [`release_code`] is a no-op for it.
pub fn press_code(backend: &dyn InputBackend, code: KeyCode) -> bool {
    if let Some(button) = MouseButton::from_code(code) {
        backend.mouse_button(button, true)
    } else if code == keys::VK_WHEEL_UP {
        backend.mouse_wheel(WheelDirection::Up, 1)
    } else if code == keys::VK_WHEEL_DOWN {
        backend.mouse_wheel(WheelDirection::Down, 1)
    } else {
        backend.key_down(code)
    }
}

pub fn release_code(backend: &dyn InputBackend, code: KeyCode) -> bool {
    if let Some(button) = MouseButton::from_code(code) {
        backend.mouse_button(button, false)
    } else if keys::is_wheel(code) {
        true
    } else {
        backend.key_up(code)
    }
}

/// Operation log entry captured by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    Button(MouseButton, bool),
    MoveAbs(i32, i32),
    Wheel(WheelDirection, i32),
}

/// Records every injected event with a timestamp. Used by the engine's
/// tests to assert ordering, pairing and timing of synthesized input.
#[derive(Default)]
pub struct RecordingBackend {
    ops: Mutex<Vec<(Instant, BackendOp)>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().unwrap().iter().map(|(_, op)| *op).collect()
    }

    pub fn timed_ops(&self) -> Vec<(Instant, BackendOp)> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn record(&self, op: BackendOp) -> bool {
        self.ops.lock().unwrap().push((Instant::now(), op));
        true
    }
}

impl InputBackend for RecordingBackend {
    fn key_down(&self, code: KeyCode) -> bool {
        self.record(BackendOp::KeyDown(code))
    }

    fn key_up(&self, code: KeyCode) -> bool {
        self.record(BackendOp::KeyUp(code))
    }

    fn mouse_button(&self, button: MouseButton, down: bool) -> bool {
        self.record(BackendOp::Button(button, down))
    }

    fn mouse_move_abs(&self, x: i32, y: i32) -> bool {
        self.record(BackendOp::MoveAbs(x, y))
    }

    fn mouse_wheel(&self, direction: WheelDirection, amount: i32) -> bool {
        self.record(BackendOp::Wheel(direction, amount))
    }

    fn is_ready(&self) -> bool {
        true
    }
}
