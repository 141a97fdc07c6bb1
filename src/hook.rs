//! Low-level keyboard and mouse capture.
//!
//! Installs WH_KEYBOARD_LL and WH_MOUSE_LL hooks and feeds raw transitions
//! into the engine's state machine. Events carrying our own injection
//! marker are passed through untouched so synthesized input can never
//! re-trigger the hotkey.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crossbeam_channel::Sender;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Console::{
    CTRL_BREAK_EVENT, CTRL_C_EVENT, CTRL_CLOSE_EVENT, SetConsoleCtrlHandler,
};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::*;
use windows::core::BOOL;

use crate::backend::sendinput::SIMULATED_EVENT_MARKER;
use crate::engine::{Engine, RawInput};
use crate::keys::{self, Modifiers};

static ENGINE: OnceLock<Arc<Engine>> = OnceLock::new();
static DISPATCH: OnceLock<Sender<RawInput>> = OnceLock::new();
static MODIFIERS: AtomicU8 = AtomicU8::new(0);
static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);

fn main_thread_id() -> &'static std::sync::atomic::AtomicU32 {
    static ID: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
    &ID
}

pub struct InputHook {
    keyboard: HHOOK,
    mouse: HHOOK,
}

// HHOOK is only used from the installing thread's message loop.
unsafe impl Send for InputHook {}

impl InputHook {
    pub fn install(engine: Arc<Engine>) -> anyhow::Result<Self> {
        // The hook callbacks only classify events; session transitions
        // (which may join worker threads) run on this thread instead so
        // the OS callback always returns promptly.
        let (tx, rx) = crossbeam_channel::unbounded::<RawInput>();
        let dispatch_engine = Arc::clone(&engine);
        std::thread::Builder::new()
            .name("input-dispatch".to_string())
            .spawn(move || {
                for input in rx.iter() {
                    dispatch_engine.handle_raw_input(input);
                }
            })?;

        ENGINE
            .set(engine)
            .map_err(|_| anyhow::anyhow!("input hook already installed"))?;
        DISPATCH
            .set(tx)
            .map_err(|_| anyhow::anyhow!("input hook already installed"))?;

        unsafe {
            let keyboard = SetWindowsHookExA(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0)?;
            let mouse = SetWindowsHookExA(WH_MOUSE_LL, Some(mouse_proc), None, 0)?;
            if keyboard.0.is_null() || mouse.0.is_null() {
                anyhow::bail!("failed to install low-level hooks");
            }
            Ok(Self { keyboard, mouse })
        }
    }

    /// Blocks on the message loop until a quit request arrives through
    /// the console handler or [`request_exit`].
    pub fn run_message_loop(self) -> anyhow::Result<()> {
        main_thread_id().store(unsafe { GetCurrentThreadId() }, Ordering::Release);

        // Force create message queue
        unsafe {
            let mut msg = MSG::default();
            let _ = PeekMessageA(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
        }

        unsafe {
            SetConsoleCtrlHandler(Some(console_handler), true)?;
        }

        unsafe {
            let mut msg = MSG::default();
            loop {
                let result = GetMessageA(&mut msg, None, 0, 0);
                if result.0 == 0 || result.0 == -1 || SHOULD_EXIT.load(Ordering::Acquire) {
                    break;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageA(&msg);
            }
            let _ = UnhookWindowsHookEx(self.keyboard);
            let _ = UnhookWindowsHookEx(self.mouse);
        }

        if let Some(engine) = ENGINE.get() {
            engine.shutdown();
        }
        Ok(())
    }
}

/// Asks the message loop to wind down.
pub fn request_exit() {
    SHOULD_EXIT.store(true, Ordering::Release);
    let thread_id = main_thread_id().load(Ordering::Acquire);
    if thread_id != 0 {
        unsafe {
            let _ = PostThreadMessageA(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

#[allow(non_snake_case)]
unsafe extern "system" fn console_handler(ctrl_type: u32) -> BOOL {
    match ctrl_type {
        CTRL_C_EVENT | CTRL_BREAK_EVENT | CTRL_CLOSE_EVENT => {
            if let Some(engine) = ENGINE.get() {
                engine.emergency_stop("console shutdown");
            }
            request_exit();
            BOOL(1)
        }
        _ => BOOL(0),
    }
}

fn track_modifier(vk: u32, is_down: bool) {
    let bit = match vk {
        0xA4 | 0xA5 | 0x12 => Modifiers::ALT,
        0xA2 | 0xA3 | 0x11 => Modifiers::CTRL,
        0xA0 | 0xA1 | 0x10 => Modifiers::SHIFT,
        0x5B | 0x5C => Modifiers::WIN,
        _ => return,
    };
    let mask = modifier_mask(bit);
    if is_down {
        MODIFIERS.fetch_or(mask, Ordering::AcqRel);
    } else {
        MODIFIERS.fetch_and(!mask, Ordering::AcqRel);
    }
}

fn modifier_mask(m: Modifiers) -> u8 {
    if m == Modifiers::ALT {
        1
    } else if m == Modifiers::CTRL {
        2
    } else if m == Modifiers::SHIFT {
        4
    } else {
        8
    }
}

fn current_modifiers() -> Modifiers {
    let raw = MODIFIERS.load(Ordering::Acquire);
    let mut m = Modifiers::NONE;
    if raw & 1 != 0 {
        m = m.union(Modifiers::ALT);
    }
    if raw & 2 != 0 {
        m = m.union(Modifiers::CTRL);
    }
    if raw & 4 != 0 {
        m = m.union(Modifiers::SHIFT);
    }
    if raw & 8 != 0 {
        m = m.union(Modifiers::WIN);
    }
    m
}

fn dispatch(code: u32, is_down: bool) -> bool {
    let Some(engine) = ENGINE.get() else {
        return false;
    };
    let input = RawInput {
        code,
        is_down,
        modifiers: current_modifiers(),
        timestamp: Instant::now(),
    };
    // Swallow decision must be synchronous; the transition itself is
    // handed to the dispatch thread.
    let consumed = engine.should_consume(&input);
    if let Some(tx) = DISPATCH.get() {
        let _ = tx.send(input);
    }
    consumed
}

unsafe extern "system" fn keyboard_proc(code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if code < 0 {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let kb_struct = unsafe { &*(l_param.0 as *mut KBDLLHOOKSTRUCT) };

    // Skip simulated key events
    if kb_struct.dwExtraInfo == SIMULATED_EVENT_MARKER {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let is_down = matches!(w_param.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN);
    track_modifier(kb_struct.vkCode, is_down);

    if dispatch(kb_struct.vkCode, is_down) {
        return LRESULT(1);
    }

    unsafe { CallNextHookEx(None, code, w_param, l_param) }
}

unsafe extern "system" fn mouse_proc(code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if code < 0 {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let ms_struct = unsafe { &*(l_param.0 as *mut MSLLHOOKSTRUCT) };

    if ms_struct.dwExtraInfo == SIMULATED_EVENT_MARKER {
        return unsafe { CallNextHookEx(None, code, w_param, l_param) };
    }

    let transition = match w_param.0 as u32 {
        WM_LBUTTONDOWN => Some((keys::VK_LBUTTON, true)),
        WM_LBUTTONUP => Some((keys::VK_LBUTTON, false)),
        WM_RBUTTONDOWN => Some((keys::VK_RBUTTON, true)),
        WM_RBUTTONUP => Some((keys::VK_RBUTTON, false)),
        WM_MBUTTONDOWN => Some((keys::VK_MBUTTON, true)),
        WM_MBUTTONUP => Some((keys::VK_MBUTTON, false)),
        WM_XBUTTONDOWN | WM_XBUTTONUP => {
            let button = (ms_struct.mouseData >> 16) as u16;
            let code = if button == 2 {
                keys::VK_XBUTTON2
            } else {
                keys::VK_XBUTTON1
            };
            Some((code, w_param.0 as u32 == WM_XBUTTONDOWN))
        }
        WM_MOUSEWHEEL => {
            let delta = (ms_struct.mouseData >> 16) as i16;
            let code = if delta > 0 {
                keys::VK_WHEEL_UP
            } else {
                keys::VK_WHEEL_DOWN
            };
            // A wheel notch has no release transition of its own; report
            // the press and an immediate release.
            let blocked = dispatch(code, true);
            let _ = dispatch(code, false);
            if blocked {
                return LRESULT(1);
            }
            None
        }
        _ => None,
    };

    if let Some((code, is_down)) = transition
        && dispatch(code, is_down)
    {
        return LRESULT(1);
    }

    unsafe { CallNextHookEx(None, code, w_param, l_param) }
}
