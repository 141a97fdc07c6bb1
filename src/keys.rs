//! Key-name parsing and formatting.
//!
//! Bindings and action lists are stored as human-readable key names in the
//! config file; everything past the config boundary works with virtual key
//! codes.

use serde::{Deserialize, Serialize};

/// Virtual key code. Mouse buttons share the code space (0x01..0x06),
/// wheel gestures use the two reserved slots below.
pub type KeyCode = u32;

pub const VK_LBUTTON: KeyCode = 0x01;
pub const VK_RBUTTON: KeyCode = 0x02;
pub const VK_MBUTTON: KeyCode = 0x04;
pub const VK_XBUTTON1: KeyCode = 0x05;
pub const VK_XBUTTON2: KeyCode = 0x06;

/// Pseudo key codes for wheel gestures. The OS reserves 0x0A/0x0B, so they
/// never collide with a real key.
pub const VK_WHEEL_UP: KeyCode = 0x0A;
pub const VK_WHEEL_DOWN: KeyCode = 0x0B;

/// Modifier key bitmask (ALT | CTRL | SHIFT | WIN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const ALT: Modifiers = Modifiers(1);
    pub const CTRL: Modifiers = Modifiers(2);
    pub const SHIFT: Modifiers = Modifiers(4);
    pub const WIN: Modifiers = Modifiers(8);

    #[inline(always)]
    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    /// True when every modifier in `required` is present in `self`.
    #[inline(always)]
    pub const fn contains(self, required: Modifiers) -> bool {
        self.0 & required.0 == required.0
    }

    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn from_name(name: &str) -> Option<Modifiers> {
        match name {
            "ALT" => Some(Self::ALT),
            "CTRL" | "CONTROL" => Some(Self::CTRL),
            "SHIFT" => Some(Self::SHIFT),
            "WIN" | "SUPER" => Some(Self::WIN),
            _ => None,
        }
    }
}

/// True for the five mouse button codes.
#[inline(always)]
pub fn is_mouse_button(code: KeyCode) -> bool {
    matches!(
        code,
        VK_LBUTTON | VK_RBUTTON | VK_MBUTTON | VK_XBUTTON1 | VK_XBUTTON2
    )
}

/// True for the wheel pseudo codes. Wheel events have no release transition,
/// so the state machine treats wheel bindings as instantaneous toggles.
#[inline(always)]
pub fn is_wheel(code: KeyCode) -> bool {
    matches!(code, VK_WHEEL_UP | VK_WHEEL_DOWN)
}

pub fn key_name_to_code(key_name: &str) -> Option<KeyCode> {
    let key = key_name.trim().to_uppercase();

    // letters and digits
    if key.len() == 1
        && let Some(c) = key.chars().next()
        && (c.is_ascii_alphabetic() || c.is_ascii_digit())
    {
        return Some(c as u32);
    }

    // F1-F24
    if key.starts_with('F')
        && key.len() > 1
        && let Ok(num) = key[1..].parse::<u32>()
        && (1..=24).contains(&num)
    {
        return Some(0x70 + num - 1);
    }

    // Numpad keys
    if key.starts_with("NUMPAD")
        && key.len() > 6
        && let Ok(num) = key[6..].parse::<u32>()
        && num <= 9
    {
        return Some(0x60 + num);
    }

    match key.as_str() {
        "ESC" | "ESCAPE" => Some(0x1B),
        "ENTER" | "RETURN" => Some(0x0D),
        "TAB" => Some(0x09),
        "PAUSE" => Some(0x13),
        "CAPSLOCK" | "CAPITAL" => Some(0x14),
        "SPACE" => Some(0x20),
        "BACKSPACE" | "BACK" => Some(0x08),
        "DELETE" => Some(0x2E),
        "INSERT" => Some(0x2D),
        "HOME" => Some(0x24),
        "END" => Some(0x23),
        "PAGEUP" => Some(0x21),
        "PAGEDOWN" => Some(0x22),
        "UP" => Some(0x26),
        "DOWN" => Some(0x28),
        "LEFT" => Some(0x25),
        "RIGHT" => Some(0x27),
        "LSHIFT" => Some(0xA0),
        "RSHIFT" => Some(0xA1),
        "LCTRL" => Some(0xA2),
        "RCTRL" => Some(0xA3),
        "LALT" => Some(0xA4),
        "RALT" => Some(0xA5),
        "LWIN" => Some(0x5B),
        "RWIN" => Some(0x5C),
        "NUMLOCK" => Some(0x90),
        "SCROLL" => Some(0x91),
        "MULTIPLY" => Some(0x6A),
        "ADD" => Some(0x6B),
        "SUBTRACT" => Some(0x6D),
        "DECIMAL" => Some(0x6E),
        "DIVIDE" => Some(0x6F),
        "LBUTTON" => Some(VK_LBUTTON),
        "RBUTTON" => Some(VK_RBUTTON),
        "MBUTTON" => Some(VK_MBUTTON),
        "XBUTTON1" => Some(VK_XBUTTON1),
        "XBUTTON2" => Some(VK_XBUTTON2),
        "WHEELUP" => Some(VK_WHEEL_UP),
        "WHEELDOWN" => Some(VK_WHEEL_DOWN),
        _ => None,
    }
}

/// Converts a virtual key code back to its canonical name.
pub fn code_to_key_name(code: KeyCode) -> String {
    match code {
        0x30..=0x39 | 0x41..=0x5A => (code as u8 as char).to_string(),
        0x60..=0x69 => format!("NUMPAD{}", code - 0x60),
        0x70..=0x87 => format!("F{}", code - 0x70 + 1),
        0x1B => "ESCAPE".to_string(),
        0x0D => "RETURN".to_string(),
        0x09 => "TAB".to_string(),
        0x13 => "PAUSE".to_string(),
        0x14 => "CAPITAL".to_string(),
        0x20 => "SPACE".to_string(),
        0x08 => "BACK".to_string(),
        0x2E => "DELETE".to_string(),
        0x2D => "INSERT".to_string(),
        0x24 => "HOME".to_string(),
        0x23 => "END".to_string(),
        0x21 => "PAGEUP".to_string(),
        0x22 => "PAGEDOWN".to_string(),
        0x26 => "UP".to_string(),
        0x28 => "DOWN".to_string(),
        0x25 => "LEFT".to_string(),
        0x27 => "RIGHT".to_string(),
        0xA0 => "LSHIFT".to_string(),
        0xA1 => "RSHIFT".to_string(),
        0xA2 => "LCTRL".to_string(),
        0xA3 => "RCTRL".to_string(),
        0xA4 => "LALT".to_string(),
        0xA5 => "RALT".to_string(),
        0x5B => "LWIN".to_string(),
        0x5C => "RWIN".to_string(),
        0x90 => "NUMLOCK".to_string(),
        0x91 => "SCROLL".to_string(),
        0x6A => "MULTIPLY".to_string(),
        0x6B => "ADD".to_string(),
        0x6D => "SUBTRACT".to_string(),
        0x6E => "DECIMAL".to_string(),
        0x6F => "DIVIDE".to_string(),
        VK_LBUTTON => "LBUTTON".to_string(),
        VK_RBUTTON => "RBUTTON".to_string(),
        VK_MBUTTON => "MBUTTON".to_string(),
        VK_XBUTTON1 => "XBUTTON1".to_string(),
        VK_XBUTTON2 => "XBUTTON2".to_string(),
        VK_WHEEL_UP => "WHEELUP".to_string(),
        VK_WHEEL_DOWN => "WHEELDOWN".to_string(),
        _ => format!("VK_{:02X}", code),
    }
}

/// Parses a binding string like `"F6"` or `"CTRL+ALT+X"` into a key code
/// plus modifier mask. The last `+`-separated part is the key, everything
/// before it must be a modifier name.
pub fn parse_binding(name: &str) -> Option<(KeyCode, Modifiers)> {
    let parts: Vec<&str> = name.split('+').map(str::trim).collect();
    let (key_part, modifier_parts) = parts.split_last()?;

    let mut modifiers = Modifiers::NONE;
    for part in modifier_parts {
        modifiers = modifiers.union(Modifiers::from_name(&part.to_uppercase())?);
    }

    let code = key_name_to_code(key_part)?;
    Some((code, modifiers))
}
