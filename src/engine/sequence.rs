//! Toggle-mode sequence executor.
//!
//! Replays the snapshot cyclically until cancelled. Every wait is sliced so
//! cancellation is observed within ~10ms, and all keys touched by the
//! snapshot are released on the way out no matter how the loop ends.

use std::time::Duration;

use smallvec::SmallVec;
use tracing::trace;

use crate::backend::{self, InputBackend, MouseButton};
use crate::keys::KeyCode;
use crate::throttle::CancelToken;

use super::types::{Action, ActionSnapshot};

const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Sleeps `ms` in cancellable slices. Returns false if cancelled mid-wait.
pub(super) fn cancellable_sleep(ms: u64, cancel: &CancelToken) -> bool {
    let mut remaining = Duration::from_millis(ms);
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let slice = remaining.min(WAIT_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    !cancel.is_cancelled()
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

    let mut index = 0usize;
    while !cancel.is_cancelled() {
        let action = &snapshot[index];
        index = (index + 1) % snapshot.len();

        match *action {
            Action::Key { code, interval_ms } => {
                if !backend::press_code(backend, code) {
                    trace!(code, "press failed");
                }
                if !cancellable_sleep(press_duration_ms, cancel) {
                    let _ = backend::release_code(backend, code);
                    break;
                }
                if !backend::release_code(backend, code) {
                    trace!(code, "release failed");
                }
                if !cancellable_sleep(interval_ms, cancel) {
                    break;
                }
            }
            Action::Coord { x, y, interval_ms } => {
                backend.mouse_move_abs(x, y);
                backend.mouse_button(MouseButton::Left, true);
                if !cancellable_sleep(press_duration_ms, cancel) {
                    backend.mouse_button(MouseButton::Left, false);
                    break;
                }
                backend.mouse_button(MouseButton::Left, false);
                if !cancellable_sleep(interval_ms, cancel) {
                    break;
                }
            }
        }
    }

    release_all(backend, snapshot);
}

/// Releases every key the snapshot can press, plus the left button when
/// coordinate clicks are present. Safe to call on an already-clean state.
pub(super) fn release_all(backend: &dyn InputBackend, snapshot: &ActionSnapshot) {
    let mut codes: SmallVec<[KeyCode; 8]> = SmallVec::new();
    let mut has_coord = false;
    for action in snapshot.iter() {
        match *action {
            Action::Key { code, .. } => {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            Action::Coord { .. } => has_coord = true,
        }
    }
    for code in codes {
        let _ = backend::release_code(backend, code);
    }
    if has_coord {
        backend.mouse_button(MouseButton::Left, false);
    }
}
