//! Hold-mode executor.
//!
//! Replays the snapshot for as long as the trigger is held, pacing each
//! step against an absolute schedule so timing error never accumulates
//! across iterations. Remainders of 2ms or less are spin-waited; longer
//! waits are slept in coarse slices with cancellation checks.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::backend::{self, InputBackend, MouseButton};
use crate::throttle::CancelToken;

use super::sequence::release_all;
use super::types::{Action, ActionSnapshot};

const SPIN_THRESHOLD: Duration = Duration::from_millis(2);
const COARSE_SLICE: Duration = Duration::from_millis(10);

/// Serializes hold session start/stop transitions. Held only around the
/// transition itself, never across a blocking worker stop.
pub struct HoldExecutor {
    transition: Mutex<()>,
}

impl HoldExecutor {
    pub fn new() -> Self {
        Self {
            transition: Mutex::new(()),
        }
    }

    /// Runs `f` under the transition lock, or skips it when another
    /// transition is already in flight. Used by session start, which may
    /// be rejected on contention.
    pub fn with_transition<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let Ok(_guard) = self.transition.try_lock() else {
            trace!("hold transition already in progress, skipping");
            return None;
        };
        Some(f())
    }

    /// Runs `f` under the transition lock, waiting for any in-flight
    /// transition to finish first. Stops must never be skipped: a start
    /// racing ahead of a stop would otherwise leave its worker injecting
    /// input with the state machine already back in Idle.
    pub fn with_transition_blocking<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.transition.lock().unwrap();
        f()
    }
}

impl Default for HoldExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits until `deadline`, checking `cancel` along the way. Returns false
/// if cancelled before the deadline.
fn wait_until(deadline: Instant, cancel: &CancelToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        if remaining <= SPIN_THRESHOLD {
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    return false;
                }
                std::hint::spin_loop();
            }
            return true;
        }
        std::thread::sleep((remaining - SPIN_THRESHOLD).min(COARSE_SLICE));
    }
}

pub fn run(
    backend: &dyn InputBackend,
    snapshot: &ActionSnapshot,
    press_duration_ms: u64,
    cancel: &CancelToken,
) {
    if snapshot.is_empty() {
        return;
    }

    let start = Instant::now();
    let mut scheduled = Duration::ZERO;
    let mut index = 0usize;

    while !cancel.is_cancelled() {
        let action = &snapshot[index];
        index = (index + 1) % snapshot.len();

        let pressed_code = match *action {
            Action::Key { code, .. } => {
                backend::press_code(backend, code);
                Some(code)
            }
            Action::Coord { x, y, .. } => {
                backend.mouse_move_abs(x, y);
                backend.mouse_button(MouseButton::Left, true);
                None
            }
        };

        scheduled += Duration::from_millis(press_duration_ms);
        if !wait_until(start + scheduled, cancel) {
            match pressed_code {
                Some(code) => {
                    let _ = backend::release_code(backend, code);
                }
                None => {
                    backend.mouse_button(MouseButton::Left, false);
                }
            }
            break;
        }

        match pressed_code {
            Some(code) => {
                backend::release_code(backend, code);
            }
            None => {
                backend.mouse_button(MouseButton::Left, false);
            }
        }

        scheduled += Duration::from_millis(action.interval_ms());
        if !wait_until(start + scheduled, cancel) {
            break;
        }
    }

    release_all(backend, snapshot);
}
