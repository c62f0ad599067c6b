//! X11 keysym to USB-HID usage-code translation.
//!
//! Covers the printable US-ASCII set plus the named keys a VNC client is
//! likely to send (arrows, function keys, navigation cluster, keypad).
//! Keysyms with no mapping translate to usage `0` (no-op).

pub const LCTRL: u8 = 1 << 0;
pub const LSHIFT: u8 = 1 << 1;
pub const LALT: u8 = 1 << 2;
pub const LGUI: u8 = 1 << 3;
pub const RCTRL: u8 = 1 << 4;
pub const RSHIFT: u8 = 1 << 5;
pub const RALT: u8 = 1 << 6;
pub const RGUI: u8 = 1 << 7;

/// Keysyms for symbols that sit on a shifted digit/punctuation key on a US
/// layout; pressing them implies a synthesized left-shift.
const SHIFTED_SYMBOLS: &[u32] = &[
    0x21, 0x40, 0x23, 0x24, 0x25, 0x5E, 0x26, 0x2A, 0x28, 0x29, 0x5F, 0x2B, 0x7B, 0x7D, 0x7C, 0x3A,
    0x22, 0x7E, 0x3C, 0x3E, 0x3F,
];

/// Returns the modifier bit a keysym contributes, or `0` if it contributes
/// none. For the eight dedicated modifier keysyms this is the modifier
/// itself; for shifted-symbol keysyms and uppercase letters it is a
/// synthesized `LSHIFT`.
pub fn modifier_for_keysym(keysym: u32) -> u8 {
    match keysym {
        0xFFE3 => LCTRL,
        0xFFE1 => LSHIFT,
        0xFFE9 => LALT,
        0xFFE7 => LGUI,
        0xFFE4 => RCTRL,
        0xFFE2 => RSHIFT,
        0xFFEA => RALT,
        0xFFE8 => RGUI,
        k if SHIFTED_SYMBOLS.contains(&k) => LSHIFT,
        k if is_uppercase_ascii_keysym(k) => LSHIFT,
        _ => 0,
    }
}

fn is_uppercase_ascii_keysym(keysym: u32) -> bool {
    (0x41..=0x5A).contains(&keysym)
}

/// Maps a keysym to a USB-HID keyboard usage code. Uppercase ASCII letters
/// are folded to lowercase first, mirroring a real keyboard where shift
/// state and key identity are reported separately.
pub fn usage_for_keysym(keysym: u32) -> u8 {
    let keysym = if is_uppercase_ascii_keysym(keysym) { keysym | 0x20 } else { keysym };
    match keysym {
        0x61 => 0x04,
        0x62 => 0x05,
        0x63 => 0x06,
        0x64 => 0x07,
        0x65 => 0x08,
        0x66 => 0x09,
        0x67 => 0x0A,
        0x68 => 0x0B,
        0x69 => 0x0C,
        0x6A => 0x0D,
        0x6B => 0x0E,
        0x6C => 0x0F,
        0x6D => 0x10,
        0x6E => 0x11,
        0x6F => 0x12,
        0x70 => 0x13,
        0x71 => 0x14,
        0x72 => 0x15,
        0x73 => 0x16,
        0x74 => 0x17,
        0x75 => 0x18,
        0x76 => 0x19,
        0x77 => 0x1A,
        0x78 => 0x1B,
        0x79 => 0x1C,
        0x7A => 0x1D,
        0x31 | 0x21 => 0x1E,
        0x32 | 0x40 => 0x1F,
        0x33 | 0x23 => 0x20,
        0x34 | 0x24 => 0x21,
        0x35 | 0x25 => 0x22,
        0x36 | 0x5E => 0x23,
        0x37 | 0x26 => 0x24,
        0x38 | 0x2A => 0x25,
        0x39 | 0x28 => 0x26,
        0x30 | 0x29 => 0x27,
        0xFF0D => 0x28, // Return
        0xFF1B => 0x29, // Escape
        0xFF08 => 0x2A, // Backspace
        0xFF09 => 0x2B, // Tab
        0x20 => 0x2C,   // Space
        0x2D | 0x5F => 0x2D,
        0x3D | 0x2B => 0x2E,
        0x5B | 0x7B => 0x2F,
        0x5D | 0x7D => 0x30,
        0x5C | 0x7C => 0x31,
        0x3B | 0x3A => 0x33,
        0x27 | 0x22 => 0x34,
        0x60 | 0x7E => 0x35,
        0x2C | 0x3C => 0x36,
        0x2E | 0x3E => 0x37,
        0x2F | 0x3F => 0x38,
        0xFFBE..=0xFFC9 => 0x3A + (keysym - 0xFFBE) as u8, // F1..F12
        0xFFCA => 0x46,                                    // PrintScreen
        0xFF02 => 0x48,                                    // Pause
        0xFF6A => 0x49,                                    // Insert
        0xFF50 => 0x4A,                                     // Home
        0xFF55 => 0x4B,                                     // PageUp
        0xFFFF => 0x4C,                                     // Delete
        0xFF57 => 0x4D,                                     // End
        0xFF56 => 0x4E,                                     // PageDown
        0xFF53 => 0x4F,                                     // Right
        0xFF51 => 0x50,                                     // Left
        0xFF54 => 0x51,                                     // Down
        0xFF52 => 0x52,                                     // Up
        0xFFAF => 0x54,                                     // Keypad /
        0xFFAA => 0x55,                                     // Keypad *
        0xFFAD => 0x56,                                     // Keypad -
        0xFFAB => 0x57,                                     // Keypad +
        0xFF8D => 0x58,                                     // Keypad Enter
        0xFFB1 => 0x59,                                     // Keypad 1
        0xFFB2 => 0x5A,                                     // Keypad 2
        0xFFB3 => 0x5B,                                     // Keypad 3
        0xFFB4 => 0x5C,                                     // Keypad 4
        0xFFB5 => 0x5D,                                     // Keypad 5
        0xFFB6 => 0x5E,                                     // Keypad 6
        0xFFB7 => 0x5F,                                     // Keypad 7
        0xFFB8 => 0x60,                                     // Keypad 8
        0xFFB9 => 0x61,                                     // Keypad 9
        0xFFB0 => 0x62,                                     // Keypad 0
        0xFFAE => 0x63,                                     // Keypad .
        _ => 0,
    }
}
