//! Hotkey state machine.
//!
//! Consumes raw key transitions from the capture layer and drives session
//! start/stop. A single binding toggles sequence sessions and gates hold
//! sessions; every unexpected failure funnels into an emergency stop so
//! the machine always lands back in an idle, keys-released state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;
use crate::keys;

use super::types::{HotkeyBinding, Mode, RawInput, SessionState};
use super::Engine;

pub(super) struct MachineState {
    pub binding: Option<HotkeyBinding>,
    pub session: SessionState,
    /// True between an observed trigger press and its release.
    pub held: bool,
    pub last_toggle: Option<Instant>,
    pub last_down: Option<Instant>,
}

impl MachineState {
    pub fn new() -> Self {
        Self {
            binding: None,
            session: SessionState::Idle,
            held: false,
            last_toggle: None,
            last_down: None,
        }
    }
}

impl Engine {
    /// Feeds one raw input transition through the state machine. Returns
    /// true when the event matched the binding and should be swallowed by
    /// the capture layer.
    pub fn handle_raw_input(self: &Arc<Self>, input: RawInput) -> bool {
        match self.process_raw(input) {
            Ok(consumed) => consumed,
            Err(e) => {
                self.emergency_stop(&format!("hotkey handling failed: {e}"));
                false
            }
        }
    }

    /// Decides whether the capture layer should swallow this event,
    /// without doing any session work. The capture hook must answer the
    /// OS immediately; the full transition runs later on the dispatch
    /// thread via [`Engine::handle_raw_input`].
    pub fn should_consume(&self, input: &RawInput) -> bool {
        let state = self.state.lock().unwrap();
        let Some(binding) = state.binding else {
            return false;
        };
        if input.code != binding.code {
            return false;
        }
        if keys::is_wheel(input.code) {
            return true;
        }
        if input.is_down {
            input.modifiers.contains(binding.modifiers)
        } else {
            state.held
        }
    }

    fn process_raw(self: &Arc<Self>, input: RawInput) -> Result<bool> {
        let Some(binding) = self.state.lock().unwrap().binding else {
            return Ok(false);
        };
        if input.code != binding.code {
            return Ok(false);
        }

        let mode = self.mode();

        // Wheel gestures have no release transition; they always act as a
        // toggle regardless of mode.
        if keys::is_wheel(input.code) {
            if input.is_down {
                if !input.modifiers.contains(binding.modifiers) {
                    return Ok(false);
                }
                self.handle_toggle(input.timestamp)?;
            }
            return Ok(true);
        }

        if input.is_down {
            if !input.modifiers.contains(binding.modifiers) {
                return Ok(false);
            }

            {
                let mut state = self.state.lock().unwrap();
                if state.held {
                    let release_timeout =
                        Duration::from_millis(self.release_timeout_ms.load(std::sync::atomic::Ordering::Acquire));
                    let within_repeat = state
                        .last_down
                        .is_some_and(|last| input.timestamp.duration_since(last) < release_timeout);
                    state.last_down = Some(input.timestamp);
                    if within_repeat {
                        // OS auto-repeat while the trigger stays down.
                        return Ok(true);
                    }
                    // No release ever arrived; assume it was lost and
                    // treat this as a fresh press.
                    debug!("trigger release was missed, re-arming");
                    state.held = false;
                }
                state.held = true;
                state.last_down = Some(input.timestamp);
            }

            match mode {
                Mode::Sequence => self.handle_toggle(input.timestamp)?,
                Mode::Hold => {
                    if self.session_state() == SessionState::Idle {
                        self.try_start();
                    }
                }
            }
            Ok(true)
        } else {
            let was_held = {
                let mut state = self.state.lock().unwrap();
                let was = state.held;
                state.held = false;
                was
            };
            if mode == Mode::Hold && was_held && self.session_state() == SessionState::Running {
                self.stop_session()?;
            }
            Ok(was_held)
        }
    }

    /// Sequence-mode toggle with debounce. Presses inside the debounce
    /// window are dropped so a jittery trigger cannot flap the session.
    fn handle_toggle(self: &Arc<Self>, timestamp: Instant) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            let debounce = Duration::from_millis(
                self.toggle_debounce_ms.load(std::sync::atomic::Ordering::Acquire),
            );
            if state
                .last_toggle
                .is_some_and(|last| timestamp.duration_since(last) < debounce)
            {
                debug!("toggle inside debounce window, ignored");
                return Ok(());
            }
            state.last_toggle = Some(timestamp);
        }

        if self.session_state() == SessionState::Running {
            self.stop_session()
        } else {
            self.try_start();
            Ok(())
        }
    }

    /// Session start where failure is a status report, not a fault. Gate
    /// refusals and backend problems must not trip the fail-safe path.
    fn try_start(self: &Arc<Self>) {
        if let Err(e) = self.start_session() {
            // start_session already reported gate refusals over the
            // event channel.
            warn!(error = %e, "session start refused");
        }
    }
}
