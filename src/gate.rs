//! Target window gate.
//!
//! Tracks whether the configured target window is focused and whether its
//! owning process is still alive. The engine consults the gate before
//! starting a session and a background poller reports status changes so a
//! running session can be stopped the moment the target loses focus.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// Opaque window identifier. On Windows this is the HWND value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Target selection: a specific window plus the process it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTarget {
    pub handle: WindowHandle,
    pub title: String,
    pub process_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// No target configured, everything is allowed.
    NoTarget,
    /// The target's process has exited.
    ProcessNotRunning,
    /// The process is alive but the remembered window handle is gone.
    WindowInvalid,
    /// The window exists but is not in the foreground.
    Inactive,
    /// The target window is focused.
    Active,
}

impl GateStatus {
    #[inline(always)]
    pub const fn to_u8(self) -> u8 {
        match self {
            GateStatus::NoTarget => 0,
            GateStatus::ProcessNotRunning => 1,
            GateStatus::WindowInvalid => 2,
            GateStatus::Inactive => 3,
            GateStatus::Active => 4,
        }
    }

    #[inline(always)]
    pub const fn from_u8(value: u8) -> GateStatus {
        match value {
            1 => GateStatus::ProcessNotRunning,
            2 => GateStatus::WindowInvalid,
            3 => GateStatus::Inactive,
            4 => GateStatus::Active,
            _ => GateStatus::NoTarget,
        }
    }

    /// True when hotkeys may trigger and sessions may keep running.
    #[inline(always)]
    pub const fn permits_execution(self) -> bool {
        matches!(self, GateStatus::NoTarget | GateStatus::Active)
    }

    pub fn describe(self) -> &'static str {
        match self {
            GateStatus::NoTarget => "no target window set",
            GateStatus::ProcessNotRunning => "target process is not running",
            GateStatus::WindowInvalid => "target window no longer exists",
            GateStatus::Inactive => "target window is not focused",
            GateStatus::Active => "target window is active",
        }
    }
}

/// Queries about the desktop's window state. The OS probe lives behind
/// this trait so the gate logic is testable off-platform.
pub trait ForegroundProbe: Send + Sync {
    fn foreground_window(&self) -> Option<WindowHandle>;
    fn is_window_valid(&self, handle: WindowHandle) -> bool;
    fn is_process_alive(&self, handle: WindowHandle) -> bool;
}

pub struct WindowGate {
    probe: Arc<dyn ForegroundProbe>,
    target: Mutex<Option<WindowTarget>>,
    status: AtomicU8,
}

impl WindowGate {
    pub fn new(probe: Arc<dyn ForegroundProbe>) -> Self {
        Self {
            probe,
            target: Mutex::new(None),
            status: AtomicU8::new(GateStatus::NoTarget.to_u8()),
        }
    }

    /// Replaces the target. `None` clears it; the gate then permits all
    /// execution until a new target is set.
    pub fn set_target(&self, target: Option<WindowTarget>) {
        *self.target.lock().unwrap() = target;
        let status = self.evaluate();
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn target(&self) -> Option<WindowTarget> {
        self.target.lock().unwrap().clone()
    }

    pub fn status(&self) -> GateStatus {
        GateStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Full evaluation: process aliveness, window validity, then focus.
    pub fn evaluate(&self) -> GateStatus {
        let target = self.target.lock().unwrap().clone();
        let Some(target) = target else {
            return GateStatus::NoTarget;
        };

        if !self.probe.is_process_alive(target.handle) {
            return GateStatus::ProcessNotRunning;
        }
        if !self.probe.is_window_valid(target.handle) {
            return GateStatus::WindowInvalid;
        }
        self.evaluate_focus_of(target.handle)
    }

    /// Cheap focus-only evaluation, skipped straight to when process and
    /// window were recently confirmed valid.
    fn evaluate_focus_of(&self, handle: WindowHandle) -> GateStatus {
        match self.probe.foreground_window() {
            Some(fg) if fg == handle => GateStatus::Active,
            _ => GateStatus::Inactive,
        }
    }

    fn evaluate_focus(&self) -> GateStatus {
        let target = self.target.lock().unwrap().clone();
        match target {
            None => GateStatus::NoTarget,
            Some(t) => {
                if !self.probe.is_window_valid(t.handle) {
                    return GateStatus::WindowInvalid;
                }
                self.evaluate_focus_of(t.handle)
            }
        }
    }
}

/// Spawns the gate poller thread. Focus is checked every `focus_poll`,
/// process aliveness every `process_poll`; `on_change` fires only on a
/// status transition. The thread exits once `shutdown` goes true.
pub fn spawn_poller<F>(
    gate: Arc<WindowGate>,
    focus_poll: Duration,
    process_poll: Duration,
    shutdown: Arc<AtomicBool>,
    on_change: F,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    F: Fn(GateStatus) + Send + 'static,
{
    std::thread::Builder::new()
        .name("gate-poller".to_string())
        .spawn(move || {
            let mut last_process_check = Instant::now();
            let mut previous = gate.status();
            while !shutdown.load(Ordering::Acquire) {
                let status = if last_process_check.elapsed() >= process_poll {
                    last_process_check = Instant::now();
                    gate.evaluate()
                } else {
                    gate.evaluate_focus()
                };

                gate.status.store(status.to_u8(), Ordering::Release);
                if status != previous {
                    debug!(from = ?previous, to = ?status, "gate status changed");
                    previous = status;
                    on_change(status);
                }
                std::thread::sleep(focus_poll);
            }
        })
}

/// Scriptable probe for tests. Focus, window validity and process
/// aliveness are all settable from the outside.
pub struct FakeProbe {
    pub foreground: Mutex<Option<WindowHandle>>,
    pub window_valid: AtomicBool,
    pub process_alive: AtomicBool,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            foreground: Mutex::new(None),
            window_valid: AtomicBool::new(true),
            process_alive: AtomicBool::new(true),
        }
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        *self.foreground.lock().unwrap() = handle;
    }
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundProbe for FakeProbe {
    fn foreground_window(&self) -> Option<WindowHandle> {
        *self.foreground.lock().unwrap()
    }

    fn is_window_valid(&self, _handle: WindowHandle) -> bool {
        self.window_valid.load(Ordering::Relaxed)
    }

    fn is_process_alive(&self, _handle: WindowHandle) -> bool {
        self.process_alive.load(Ordering::Relaxed)
    }
}

#[cfg(windows)]
pub mod win {
    use windows::Win32::Foundation::{CloseHandle, HWND};
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetForegroundWindow, GetWindowThreadProcessId, IsWindow,
    };

    use super::{ForegroundProbe, WindowHandle};

    const STILL_ACTIVE: u32 = 259;

    pub struct WinProbe;

    impl ForegroundProbe for WinProbe {
        fn foreground_window(&self) -> Option<WindowHandle> {
            let hwnd = unsafe { GetForegroundWindow() };
            if hwnd.is_invalid() {
                None
            } else {
                Some(WindowHandle(hwnd.0 as isize))
            }
        }

        fn is_window_valid(&self, handle: WindowHandle) -> bool {
            unsafe { IsWindow(Some(HWND(handle.0 as *mut _))).as_bool() }
        }

        fn is_process_alive(&self, handle: WindowHandle) -> bool {
            unsafe {
                let mut pid = 0u32;
                GetWindowThreadProcessId(HWND(handle.0 as *mut _), Some(&mut pid));
                if pid == 0 {
                    return false;
                }
                let Ok(process) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) else {
                    return false;
                };
                let mut exit_code = 0u32;
                let alive = GetExitCodeProcess(process, &mut exit_code).is_ok()
                    && exit_code == STILL_ACTIVE;
                let _ = CloseHandle(process);
                alive
            }
        }
    }
}
