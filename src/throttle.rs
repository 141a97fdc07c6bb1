//! Named worker throttle.
//!
//! Wraps thread spawning with a capacity cap and stop-with-timeout
//! bookkeeping. Permits are tokens in a bounded channel; a worker holds its
//! permit for its whole lifetime and returns it on exit, so an abandoned
//! worker keeps its permit until the thread actually finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Worker scheduling priority. On Windows, `High` and `Low` map onto
/// `SetThreadPriority` above/below normal; on other platforms the tag only
/// shows up in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPriority {
    Low,
    Normal,
    High,
}

#[cfg(windows)]
fn apply_priority(priority: WorkerPriority) {
    use windows::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
        THREAD_PRIORITY_BELOW_NORMAL,
    };

    let level = match priority {
        WorkerPriority::High => THREAD_PRIORITY_ABOVE_NORMAL,
        WorkerPriority::Low => THREAD_PRIORITY_BELOW_NORMAL,
        WorkerPriority::Normal => return,
    };
    if unsafe { SetThreadPriority(GetCurrentThread(), level) }.is_err() {
        warn!(?priority, "failed to set thread priority");
    }
}

#[cfg(not(windows))]
fn apply_priority(_priority: WorkerPriority) {}

/// Cooperative cancellation flag handed to worker bodies.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    #[inline(always)]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct WorkerEntry {
    cancel: CancelToken,
    done_rx: Receiver<()>,
}

pub struct WorkerThrottle {
    permit_tx: Sender<()>,
    permit_rx: Receiver<()>,
    workers: scc::HashMap<String, WorkerEntry>,
}

impl WorkerThrottle {
    pub fn new(capacity: usize) -> Self {
        let (permit_tx, permit_rx) = bounded(capacity);
        for _ in 0..capacity {
            permit_tx.send(()).unwrap();
        }
        Self {
            permit_tx,
            permit_rx,
            workers: scc::HashMap::new(),
        }
    }

    /// Starts a named worker. An existing worker with the same name is
    /// stopped first (5s timeout), then a permit is acquired and the body
    /// runs on a fresh named thread with a cancellation token.
    pub fn start<F>(&self, name: &str, priority: WorkerPriority, body: F) -> Result<()>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        if self.workers.contains_sync(name) {
            self.stop(name, Duration::from_secs(5))?;
        }

        let Ok(()) = self.permit_rx.recv_timeout(Duration::from_millis(100)) else {
            return Err(EngineError::PoolExhausted);
        };

        let cancel = CancelToken::new();
        let (done_tx, done_rx) = bounded(1);
        let entry = WorkerEntry {
            cancel: cancel.clone(),
            done_rx,
        };
        let _ = self.workers.insert_sync(name.to_string(), entry);

        debug!(worker = name, ?priority, "starting worker");
        let permit_tx = self.permit_tx.clone();
        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                apply_priority(priority);
                body(cancel);
                let _ = done_tx.send(());
                let _ = permit_tx.send(());
            });
        if spawned.is_err() {
            // Undo the reservation; nothing will ever signal this entry.
            let _ = self.workers.remove_sync(name);
            let _ = self.permit_tx.send(());
            warn!(worker = name, "failed to spawn worker thread");
            return Err(EngineError::PoolExhausted);
        }
        Ok(())
    }

    /// Cancels a worker and waits up to `timeout` for it to finish. On
    /// timeout the bookkeeping entry is already dropped and the thread is
    /// abandoned; it still owns its permit until it exits on its own.
    pub fn stop(&self, name: &str, timeout: Duration) -> Result<()> {
        let Some((_, entry)) = self.workers.remove_sync(name) else {
            return Ok(());
        };

        entry.cancel.cancel();
        match entry.done_rx.recv_timeout(timeout) {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(worker = name, timeout_ms = timeout.as_millis() as u64, "worker did not stop in time, abandoning");
                Err(EngineError::StopTimeout {
                    name: name.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Stops every tracked worker. Timeout errors are collected into the
    /// first failure; remaining workers are still signalled.
    pub fn stop_all(&self, timeout: Duration) -> Result<()> {
        let mut names: SmallVec<[String; 4]> = SmallVec::new();
        self.workers.retain_sync(|name, _| {
            names.push(name.clone());
            true
        });

        let mut first_err = None;
        for name in names {
            if let Err(e) = self.stop(&name, timeout) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.workers.contains_sync(name)
    }
}
