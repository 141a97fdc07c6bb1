//! `SendInput`-based injection backend.

use windows::Win32::UI::Input::KeyboardAndMouse::*;
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::{InputBackend, MouseButton, WheelDirection};
use crate::keys::KeyCode;

/// Marker in dwExtraInfo so the low-level hooks can tell our own injected
/// events apart from physical input.
pub const SIMULATED_EVENT_MARKER: usize = 0x4B52;

const WHEEL_DELTA: i32 = 120;

pub struct SendInputBackend;

impl SendInputBackend {
    pub fn new() -> Self {
        SendInputBackend
    }

    fn send_key(&self, code: KeyCode, up: bool) -> bool {
        let mut flags = KEYBD_EVENT_FLAGS(0);
        if up {
            flags |= KEYEVENTF_KEYUP;
        }
        if Self::is_extended_key(code) {
            flags |= KEYEVENTF_EXTENDEDKEY;
        }

        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(code as u16),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: SIMULATED_EVENT_MARKER,
                },
            },
        };

        unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) == 1 }
    }

    fn send_mouse(&self, flags: MOUSE_EVENT_FLAGS, dx: i32, dy: i32, mouse_data: u32) -> bool {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: mouse_data,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: SIMULATED_EVENT_MARKER,
                },
            },
        };

        unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) == 1 }
    }

    #[inline(always)]
    fn is_extended_key(code: KeyCode) -> bool {
        // Arrow cluster, nav cluster, right-side modifiers, numpad divide.
        matches!(
            code,
            0x21..=0x2E | 0x5B | 0x5C | 0x6F | 0x90 | 0xA3 | 0xA5
        )
    }
}

impl InputBackend for SendInputBackend {
    fn key_down(&self, code: KeyCode) -> bool {
        self.send_key(code, false)
    }

    fn key_up(&self, code: KeyCode) -> bool {
        self.send_key(code, true)
    }

    fn mouse_button(&self, button: MouseButton, down: bool) -> bool {
        let (flags, mouse_data) = match (button, down) {
            (MouseButton::Left, true) => (MOUSEEVENTF_LEFTDOWN, 0),
            (MouseButton::Left, false) => (MOUSEEVENTF_LEFTUP, 0),
            (MouseButton::Right, true) => (MOUSEEVENTF_RIGHTDOWN, 0),
            (MouseButton::Right, false) => (MOUSEEVENTF_RIGHTUP, 0),
            (MouseButton::Middle, true) => (MOUSEEVENTF_MIDDLEDOWN, 0),
            (MouseButton::Middle, false) => (MOUSEEVENTF_MIDDLEUP, 0),
            (MouseButton::X1, true) => (MOUSEEVENTF_XDOWN, 1),
            (MouseButton::X1, false) => (MOUSEEVENTF_XUP, 1),
            (MouseButton::X2, true) => (MOUSEEVENTF_XDOWN, 2),
            (MouseButton::X2, false) => (MOUSEEVENTF_XUP, 2),
        };
        self.send_mouse(flags, 0, 0, mouse_data)
    }

    fn mouse_move_abs(&self, x: i32, y: i32) -> bool {
        // Absolute coordinates are normalized to a 0..65535 grid.
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if width <= 0 || height <= 0 {
            return false;
        }
        let dx = x.clamp(0, width - 1) * 65535 / (width - 1).max(1);
        let dy = y.clamp(0, height - 1) * 65535 / (height - 1).max(1);
        self.send_mouse(MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE, dx, dy, 0)
    }

    fn mouse_wheel(&self, direction: WheelDirection, amount: i32) -> bool {
        let delta = match direction {
            WheelDirection::Up => WHEEL_DELTA * amount,
            WheelDirection::Down => -WHEEL_DELTA * amount,
        };
        self.send_mouse(MOUSEEVENTF_WHEEL, 0, 0, delta as u32)
    }

    fn is_ready(&self) -> bool {
        true
    }
}
