//! Session engine.
//!
//! Owns the hotkey state machine, the executors and the rapid-fire
//! subsystem, and wires them to the window gate. All mutable session state
//! lives behind one broad mutex; hold session transitions additionally go
//! through the executor's narrow lock, and the broad lock is never held
//! across a blocking worker stop.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::backend::InputBackend;
use crate::error::{EngineError, Result};
use crate::gate::{GateStatus, WindowGate, WindowTarget};
use crate::throttle::{WorkerPriority, WorkerThrottle};

mod hold;
mod hotkey;
mod rapid_fire;
mod sequence;
mod types;

#[cfg(test)]
mod tests;

pub use hold::HoldExecutor;
pub use rapid_fire::RapidFire;
pub use types::{
    Action, ActionSnapshot, EngineEvent, HotkeyBinding, Mode, RapidFireConfig, RawInput,
    SessionState,
};

use hotkey::MachineState;

/// Name of the single session worker slot.
const SESSION_WORKER: &str = "session";

const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const EMERGENCY_STOP_TIMEOUT: Duration = Duration::from_millis(200);

pub const DEFAULT_PRESS_DURATION_MS: u64 = 5;
pub const DEFAULT_TOGGLE_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 50;

pub struct Engine {
    backend: Arc<dyn InputBackend>,
    gate: Arc<WindowGate>,
    throttle: WorkerThrottle,
    rapid_fire: RapidFire,
    hold: HoldExecutor,

    state: Mutex<MachineState>,
    mode: AtomicU8,
    actions: Mutex<Vec<Action>>,
    last_snapshot: Mutex<Option<ActionSnapshot>>,

    press_duration_ms: AtomicU64,
    toggle_debounce_ms: AtomicU64,
    release_timeout_ms: AtomicU64,

    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
}

impl Engine {
    pub fn new(backend: Arc<dyn InputBackend>, gate: Arc<WindowGate>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            rapid_fire: RapidFire::new(Arc::clone(&backend)),
            backend,
            gate,
            throttle: WorkerThrottle::new(1),
            hold: HoldExecutor::new(),
            state: Mutex::new(MachineState::new()),
            mode: AtomicU8::new(Mode::Sequence.to_u8()),
            actions: Mutex::new(Vec::new()),
            last_snapshot: Mutex::new(None),
            press_duration_ms: AtomicU64::new(DEFAULT_PRESS_DURATION_MS),
            toggle_debounce_ms: AtomicU64::new(DEFAULT_TOGGLE_DEBOUNCE_MS),
            release_timeout_ms: AtomicU64::new(DEFAULT_RELEASE_TIMEOUT_MS),
            event_tx,
            event_rx,
        }
    }

    /// Event stream. The receiver is shared; each event is delivered to
    /// one consumer.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn emit_status(&self, text: impl Into<String>, is_error: bool) {
        self.emit(EngineEvent::Status {
            text: text.into(),
            is_error,
        });
    }

    /// Registers the toggle binding. The same binding both starts and
    /// stops a session; registering replaces any previous binding.
    pub fn register_hotkey(&self, name: &str) -> Result<()> {
        let binding = HotkeyBinding::parse(name)?;
        let mut state = self.state.lock().unwrap();
        state.binding = Some(binding);
        info!(hotkey = name, "hotkey registered");
        Ok(())
    }

    pub fn hotkey(&self) -> Option<HotkeyBinding> {
        self.state.lock().unwrap().binding
    }

    /// Replaces the live action list. A running session keeps its
    /// snapshot and is unaffected.
    pub fn set_action_list(&self, actions: Vec<Action>) -> Result<()> {
        for action in &actions {
            action.validate()?;
        }
        *self.actions.lock().unwrap() = actions;
        Ok(())
    }

    pub fn action_list(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Switches execution mode. A running session is stopped first and
    /// restarted in the new mode.
    pub fn set_mode(self: &Arc<Self>, mode: Mode) -> Result<()> {
        if self.mode() == mode {
            return Ok(());
        }
        let was_running = self.session_state() == SessionState::Running;
        if was_running {
            self.stop_session()?;
        }
        self.mode.store(mode.to_u8(), Ordering::Release);
        self.emit(EngineEvent::ModeSwitched(mode));
        if was_running {
            self.start_session()?;
        }
        Ok(())
    }

    pub fn set_target_window(&self, target: Option<WindowTarget>) {
        self.gate.set_target(target);
    }

    /// Hold duration for each synthesized press, floored at 1ms.
    pub fn set_press_duration(&self, ms: u64) {
        self.press_duration_ms.store(ms.max(1), Ordering::Release);
    }

    pub fn press_duration(&self) -> u64 {
        self.press_duration_ms.load(Ordering::Acquire)
    }

    pub fn set_toggle_debounce(&self, ms: u64) {
        self.toggle_debounce_ms.store(ms, Ordering::Release);
    }

    pub fn set_release_timeout(&self, ms: u64) {
        self.release_timeout_ms.store(ms, Ordering::Release);
    }

    pub fn rapid_fire(&self) -> &RapidFire {
        &self.rapid_fire
    }

    pub fn session_state(&self) -> SessionState {
        self.state.lock().unwrap().session
    }

    /// Starts a session in the current mode. The action list is snapshot
    /// here; keys owned by rapid fire are filtered out of the snapshot.
    pub fn start_session(self: &Arc<Self>) -> Result<()> {
        if !self.backend.is_ready() {
            return Err(EngineError::BackendUnavailable);
        }

        let gate_status = self.gate.evaluate();
        if !gate_status.permits_execution() {
            self.emit_status(gate_status.describe(), true);
            return Err(EngineError::GateBlocked(gate_status.describe().to_string()));
        }

        let snapshot = self.build_snapshot();
        {
            let mut state = self.state.lock().unwrap();
            if state.binding.is_none() {
                return Err(EngineError::NoHotkey);
            }
            if state.session == SessionState::Running {
                return Err(EngineError::AlreadyRunning);
            }
            if snapshot.is_empty() {
                self.emit_status("action list is empty, nothing to run", false);
                return Ok(());
            }
            state.session = SessionState::Running;
        }
        *self.last_snapshot.lock().unwrap() = Some(Arc::clone(&snapshot));

        let mode = self.mode();
        let press_ms = self.press_duration();
        let backend = Arc::clone(&self.backend);
        let engine = Arc::clone(self);

        let spawn = || {
            self.throttle
                .start(SESSION_WORKER, WorkerPriority::High, move |cancel| {
                    match mode {
                        Mode::Sequence => {
                            sequence::run(backend.as_ref(), &snapshot, press_ms, &cancel)
                        }
                        Mode::Hold => hold::run(backend.as_ref(), &snapshot, press_ms, &cancel),
                    }
                    debug!("session worker finished");
                    drop(engine);
                })
        };

        let spawned = match mode {
            Mode::Hold => self
                .hold
                .with_transition(spawn)
                .unwrap_or(Err(EngineError::AlreadyRunning)),
            Mode::Sequence => spawn(),
        };

        if let Err(e) = spawned {
            self.state.lock().unwrap().session = SessionState::Idle;
            return Err(e);
        }

        info!(?mode, steps = self.last_snapshot_len(), "session started");
        self.emit(EngineEvent::SessionStarted(mode));
        Ok(())
    }

    /// Stops the running session, waiting for the worker to wind down and
    /// releasing anything the snapshot could have left pressed.
    pub fn stop_session(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.session != SessionState::Running {
                return Ok(());
            }
            state.session = SessionState::Idle;
        }

        let result = match self.mode() {
            // Blocks until any in-flight start transition finishes; a
            // skipped stop would orphan the worker it was meant to cancel.
            Mode::Hold => self
                .hold
                .with_transition_blocking(|| self.throttle.stop(SESSION_WORKER, STOP_TIMEOUT)),
            Mode::Sequence => self.throttle.stop(SESSION_WORKER, STOP_TIMEOUT),
        };

        self.release_snapshot_keys();
        self.emit(EngineEvent::SessionStopped);
        info!("session stopped");
        result
    }

    /// Immediate stop used by the fail-safe paths: gate loss, hook errors
    /// and shutdown. Also tears down rapid-fire bursts and never waits
    /// long for the worker.
    pub fn emergency_stop(&self, reason: &str) {
        warn!(reason, "emergency stop");
        let was_running = {
            let mut state = self.state.lock().unwrap();
            let was = state.session == SessionState::Running;
            state.session = SessionState::Idle;
            state.held = false;
            was
        };

        if self.throttle.is_running(SESSION_WORKER)
            && self
                .throttle
                .stop(SESSION_WORKER, EMERGENCY_STOP_TIMEOUT)
                .is_err()
        {
            warn!("session worker abandoned during emergency stop");
        }
        self.rapid_fire.stop_all();
        self.release_snapshot_keys();

        self.emit_status(reason, true);
        if was_running {
            self.emit(EngineEvent::SessionStopped);
        }
    }

    /// Gate poller callback. A running session must end the moment the
    /// target stops being usable.
    pub fn on_gate_change(self: &Arc<Self>, status: GateStatus) {
        if status.permits_execution() {
            // Burst loops torn down by an emergency stop come back once
            // the target is usable again.
            self.rapid_fire.resume();
            self.emit_status(status.describe(), false);
            return;
        }
        if self.session_state() == SessionState::Running {
            self.emergency_stop(status.describe());
        } else {
            self.emit_status(status.describe(), false);
        }
    }

    pub fn shutdown(&self) {
        let _ = self.stop_session();
        self.rapid_fire.stop_all();
        let _ = self.throttle.stop_all(STOP_TIMEOUT);
    }

    fn build_snapshot(&self) -> ActionSnapshot {
        let actions = self.actions.lock().unwrap();
        actions
            .iter()
            .filter(|action| match action {
                Action::Key { code, .. } => !self.rapid_fire.excludes(*code),
                Action::Coord { .. } => true,
            })
            .copied()
            .collect::<Vec<_>>()
            .into()
    }

    fn last_snapshot_len(&self) -> usize {
        self.last_snapshot
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, |s| s.len())
    }

    fn release_snapshot_keys(&self) {
        if let Some(snapshot) = self.last_snapshot.lock().unwrap().as_ref() {
            sequence::release_all(self.backend.as_ref(), snapshot);
        }
    }

    #[cfg(test)]
    pub(crate) fn pressed_codes_in_snapshot(&self) -> Vec<crate::keys::KeyCode> {
        self.last_snapshot
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| {
                s.iter()
                    .filter_map(|a| match a {
                        Action::Key { code, .. } => Some(*code),
                        Action::Coord { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
