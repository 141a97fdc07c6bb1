//! Rapid-fire subsystem.
//!
//! Each configured key gets its own burst thread that alternates press and
//! release with the key's own timings. Keys with a rapid-fire config are
//! excluded from session snapshots so the two subsystems never fight over
//! the same key.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, warn};

use crate::backend::{self, InputBackend};
use crate::keys::KeyCode;
use crate::throttle::CancelToken;

use super::sequence::cancellable_sleep;
use super::types::RapidFireConfig;

const STOP_TIMEOUT: Duration = Duration::from_secs(1);

struct BurstHandle {
    cancel: CancelToken,
    done_rx: Receiver<()>,
}

pub struct RapidFire {
    backend: Arc<dyn InputBackend>,
    enabled: AtomicBool,
    configs: scc::HashMap<KeyCode, RapidFireConfig>,
    active: scc::HashMap<KeyCode, BurstHandle>,
}

impl RapidFire {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            enabled: AtomicBool::new(false),
            configs: scc::HashMap::new(),
            active: scc::HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// True when the key belongs to rapid fire and must be filtered out of
    /// session snapshots.
    pub fn excludes(&self, code: KeyCode) -> bool {
        self.is_enabled() && self.configs.contains_sync(&code)
    }

    /// Adds or replaces a key's burst parameters. A loop already running
    /// for the key is restarted with the new timings.
    pub fn set_config(&self, code: KeyCode, config: RapidFireConfig) {
        let config = RapidFireConfig {
            press_ms: config.press_ms.max(1),
            burst_delay_ms: config.burst_delay_ms.max(1),
        };
        let _ = self.configs.upsert_sync(code, config);
        if self.is_enabled() {
            self.stop_burst(code);
            self.start_burst(code, config);
        }
    }

    pub fn remove_config(&self, code: KeyCode) {
        let _ = self.configs.remove_sync(&code);
        self.stop_burst(code);
    }

    pub fn configured_keys(&self) -> Vec<KeyCode> {
        let mut keys = Vec::new();
        self.configs.retain_sync(|code, _| {
            keys.push(*code);
            true
        });
        keys
    }

    /// Enabling starts a burst loop for every configured key; disabling
    /// stops them all. Enabling while already enabled revives any
    /// configured key whose loop is not running (after an emergency stop
    /// tore the loops down).
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if enabled {
            self.start_missing_bursts();
        } else if previous {
            self.stop_all();
        }
    }

    /// Restarts burst loops for configured keys after a fail-safe stop.
    /// No-op while disabled; loops already running are left alone.
    pub fn resume(&self) {
        if self.is_enabled() {
            self.start_missing_bursts();
        }
    }

    fn start_missing_bursts(&self) {
        let mut entries = Vec::new();
        self.configs.retain_sync(|code, config| {
            if !self.active.contains_sync(code) {
                entries.push((*code, *config));
            }
            true
        });
        for (code, config) in entries {
            self.start_burst(code, config);
        }
    }

    pub fn stop_all(&self) {
        let mut codes = Vec::new();
        self.active.retain_sync(|code, _| {
            codes.push(*code);
            true
        });
        for code in codes {
            self.stop_burst(code);
        }
    }

    fn start_burst(&self, code: KeyCode, config: RapidFireConfig) {
        let cancel = CancelToken::new();
        let (done_tx, done_rx) = bounded(1);
        let handle = BurstHandle {
            cancel: cancel.clone(),
            done_rx,
        };
        let _ = self.active.insert_sync(code, handle);

        debug!(code, press_ms = config.press_ms, delay_ms = config.burst_delay_ms, "starting burst loop");
        let backend = Arc::clone(&self.backend);
        let spawned = std::thread::Builder::new()
            .name(format!("burst-{code:#04x}"))
            .spawn(move || {
                burst_loop(backend.as_ref(), code, config, &cancel);
                let _ = done_tx.send(());
            });
        if spawned.is_err() {
            warn!(code, "failed to spawn burst loop");
            let _ = self.active.remove_sync(&code);
        }
    }

    fn stop_burst(&self, code: KeyCode) {
        let Some((_, handle)) = self.active.remove_sync(&code) else {
            return;
        };
        handle.cancel.cancel();
        if handle.done_rx.recv_timeout(STOP_TIMEOUT).is_err() {
            warn!(code, "burst loop did not stop in time, abandoning");
        }
    }
}

fn burst_loop(
    backend: &dyn InputBackend,
    code: KeyCode,
    config: RapidFireConfig,
    cancel: &CancelToken,
) {
    while !cancel.is_cancelled() {
        backend::press_code(backend, code);
        if !cancellable_sleep(config.press_ms, cancel) {
            break;
        }
        backend::release_code(backend, code);
        if !cancellable_sleep(config.burst_delay_ms, cancel) {
            return;
        }
    }
    // The loop may exit with the key still down.
    let _ = backend::release_code(backend, code);
}
