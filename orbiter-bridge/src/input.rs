//! Mouse and keyboard input as delivered by the host
//!
//! Mouse events carry Win32 window message codes. Keyboard state is a
//! 256-byte DirectInput buffer indexed by scan code; a key is down when bit
//! 0x80 of its byte is set.

use serde::Serialize;
use std::fmt;
use std::os::raw::c_char;

/// Keyboard state buffer indexed by DirectInput scan code
pub type KeyStateBuffer = [c_char; 256];

const KEY_DOWN: c_char = 0x80u8 as c_char;

/// DirectInput scan code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Key(pub u8);

macro_rules! keys {
    ($($name:ident = $code:literal),* $(,)?) => {
        impl Key {
            $(pub const $name: Key = Key($code);)*

            /// Every named key
            pub const NAMED: &'static [Key] = &[$(Key::$name),*];

            /// Symbolic name, `None` for unnamed scan codes
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some(stringify!($name)),)*
                    _ => None,
                }
            }

            /// Look a key up by its symbolic name, case-insensitive
            pub fn from_name(name: &str) -> Option<Key> {
                $(
                    if name.eq_ignore_ascii_case(stringify!($name)) {
                        return Some(Key::$name);
                    }
                )*
                None
            }
        }
    };
}

keys! {
    ESCAPE = 0x01,
    K1 = 0x02, K2 = 0x03, K3 = 0x04, K4 = 0x05, K5 = 0x06,
    K6 = 0x07, K7 = 0x08, K8 = 0x09, K9 = 0x0A, K0 = 0x0B,
    MINUS = 0x0C,
    EQUALS = 0x0D,
    BACK = 0x0E,
    TAB = 0x0F,
    Q = 0x10, W = 0x11, E = 0x12, R = 0x13, T = 0x14,
    Y = 0x15, U = 0x16, I = 0x17, O = 0x18, P = 0x19,
    LBRACKET = 0x1A,
    RBRACKET = 0x1B,
    RETURN = 0x1C,
    LCONTROL = 0x1D,
    A = 0x1E, S = 0x1F, D = 0x20, F = 0x21, G = 0x22,
    H = 0x23, J = 0x24, K = 0x25, L = 0x26,
    SEMICOLON = 0x27,
    APOSTROPHE = 0x28,
    GRAVE = 0x29,
    LSHIFT = 0x2A,
    BACKSLASH = 0x2B,
    Z = 0x2C, X = 0x2D, C = 0x2E, V = 0x2F, B = 0x30, N = 0x31, M = 0x32,
    COMMA = 0x33,
    PERIOD = 0x34,
    SLASH = 0x35,
    RSHIFT = 0x36,
    MULTIPLY = 0x37,
    LALT = 0x38,
    SPACE = 0x39,
    CAPITAL = 0x3A,
    F1 = 0x3B, F2 = 0x3C, F3 = 0x3D, F4 = 0x3E, F5 = 0x3F,
    F6 = 0x40, F7 = 0x41, F8 = 0x42, F9 = 0x43, F10 = 0x44,
    NUMLOCK = 0x45,
    SCROLL = 0x46,
    NUMPAD7 = 0x47, NUMPAD8 = 0x48, NUMPAD9 = 0x49,
    SUBTRACT = 0x4A,
    NUMPAD4 = 0x4B, NUMPAD5 = 0x4C, NUMPAD6 = 0x4D,
    ADD = 0x4E,
    NUMPAD1 = 0x4F, NUMPAD2 = 0x50, NUMPAD3 = 0x51, NUMPAD0 = 0x52,
    DECIMAL = 0x53,
    F11 = 0x57,
    F12 = 0x58,
    NUMPADENTER = 0x9C,
    RCONTROL = 0x9D,
    DIVIDE = 0xB5,
    RALT = 0xB8,
    HOME = 0xC7,
    UP = 0xC8,
    PRIOR = 0xC9,
    LEFT = 0xCB,
    RIGHT = 0xCD,
    END = 0xCF,
    DOWN = 0xD0,
    NEXT = 0xD1,
    INSERT = 0xD2,
    DELETE = 0xD3,
}

impl Key {
    pub fn code(self) -> u32 {
        u32::from(self.0)
    }

    /// Key for a buffered-key code; codes outside the buffer are `None`
    pub fn from_code(code: u32) -> Option<Key> {
        u8::try_from(code).ok().map(Key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "KEY_{:#04X}", self.0),
        }
    }
}

/// Mutable view over the host's keyboard state buffer
pub struct KeyStates<'a>(&'a mut KeyStateBuffer);

impl<'a> KeyStates<'a> {
    pub fn new(buffer: &'a mut KeyStateBuffer) -> Self {
        Self(buffer)
    }

    /// Wrap the buffer pointer handed to a keyboard callback
    ///
    /// # Safety
    /// `ptr` must be null or point to 256 writable bytes that stay valid and
    /// unaliased for `'a`.
    pub unsafe fn from_raw(ptr: *mut c_char) -> Option<Self> {
        (ptr as *mut KeyStateBuffer).as_mut().map(Self)
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.0[usize::from(key.0)] & KEY_DOWN != 0
    }

    pub fn set_down(&mut self, key: Key, down: bool) {
        let state = &mut self.0[usize::from(key.0)];
        if down {
            *state |= KEY_DOWN;
        } else {
            *state &= !KEY_DOWN;
        }
    }

    /// Mark a key as handled so the host ignores it
    pub fn reset(&mut self, key: Key) {
        self.0[usize::from(key.0)] = 0;
    }

    pub fn control(&self) -> bool {
        self.is_down(Key::LCONTROL) || self.is_down(Key::RCONTROL)
    }

    pub fn shift(&self) -> bool {
        self.is_down(Key::LSHIFT) || self.is_down(Key::RSHIFT)
    }

    pub fn alt(&self) -> bool {
        self.is_down(Key::LALT) || self.is_down(Key::RALT)
    }

    /// Keys currently held down
    pub fn pressed(&self) -> impl Iterator<Item = Key> + '_ {
        (0..=u8::MAX).map(Key).filter(move |key| self.is_down(*key))
    }
}

impl fmt::Debug for KeyStates<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.pressed()).finish()
    }
}

/// Win32 mouse message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseEventKind {
    Move,
    LeftDown,
    LeftUp,
    LeftDoubleClick,
    RightDown,
    RightUp,
    RightDoubleClick,
    MiddleDown,
    MiddleUp,
    MiddleDoubleClick,
    Wheel,
    Other(u32),
}

impl MouseEventKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x200 => MouseEventKind::Move,
            0x201 => MouseEventKind::LeftDown,
            0x202 => MouseEventKind::LeftUp,
            0x203 => MouseEventKind::LeftDoubleClick,
            0x204 => MouseEventKind::RightDown,
            0x205 => MouseEventKind::RightUp,
            0x206 => MouseEventKind::RightDoubleClick,
            0x207 => MouseEventKind::MiddleDown,
            0x208 => MouseEventKind::MiddleUp,
            0x209 => MouseEventKind::MiddleDoubleClick,
            0x20A => MouseEventKind::Wheel,
            other => MouseEventKind::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            MouseEventKind::Move => 0x200,
            MouseEventKind::LeftDown => 0x201,
            MouseEventKind::LeftUp => 0x202,
            MouseEventKind::LeftDoubleClick => 0x203,
            MouseEventKind::RightDown => 0x204,
            MouseEventKind::RightUp => 0x205,
            MouseEventKind::RightDoubleClick => 0x206,
            MouseEventKind::MiddleDown => 0x207,
            MouseEventKind::MiddleUp => 0x208,
            MouseEventKind::MiddleDoubleClick => 0x209,
            MouseEventKind::Wheel => 0x20A,
            MouseEventKind::Other(code) => code,
        }
    }
}

/// Mouse event with window-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    /// Button and modifier state flags
    pub state: u32,
    pub x: u32,
    pub y: u32,
}

impl MouseEvent {
    pub fn from_raw(event: u32, state: u32, x: u32, y: u32) -> Self {
        Self {
            kind: MouseEventKind::from_code(event),
            state,
            x,
            y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state_bits() {
        let mut buffer: KeyStateBuffer = [0; 256];
        buffer[usize::from(Key::F1.0)] = KEY_DOWN;
        buffer[usize::from(Key::RCONTROL.0)] = KEY_DOWN | 0x01;

        let mut keys = KeyStates::new(&mut buffer);
        assert!(keys.is_down(Key::F1));
        assert!(keys.control());
        assert!(!keys.shift());

        keys.reset(Key::F1);
        keys.set_down(Key::LSHIFT, true);
        assert!(!keys.is_down(Key::F1));
        assert!(keys.shift());
        assert_eq!(keys.pressed().collect::<Vec<_>>(), vec![Key::LSHIFT, Key::RCONTROL]);

        keys.set_down(Key::RCONTROL, false);
        assert_eq!(buffer[usize::from(Key::RCONTROL.0)], 0x01);
    }

    #[test]
    fn test_from_raw_null() {
        assert!(unsafe { KeyStates::from_raw(std::ptr::null_mut()) }.is_none());

        let mut buffer: KeyStateBuffer = [0; 256];
        let mut keys = unsafe { KeyStates::from_raw(buffer.as_mut_ptr()) }.unwrap();
        keys.set_down(Key::SPACE, true);
        assert_eq!(buffer[0x39], KEY_DOWN);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(Key::from_name("space"), Some(Key::SPACE));
        assert_eq!(Key::from_name("F10"), Some(Key(0x44)));
        assert_eq!(Key::from_name("nope"), None);
        assert_eq!(Key::ESCAPE.to_string(), "ESCAPE");
        assert_eq!(Key(0xFF).to_string(), "KEY_0xFF");
        assert!(Key::NAMED.iter().all(|k| Key::from_name(k.name().unwrap()) == Some(*k)));
        assert_eq!(Key::from_code(0x1C), Some(Key::RETURN));
        assert_eq!(Key::from_code(0x100), None);
    }

    #[test]
    fn test_mouse_codes() {
        let event = MouseEvent::from_raw(0x204, 2, 640, 480);
        assert_eq!(event.kind, MouseEventKind::RightDown);
        assert_eq!((event.x, event.y), (640, 480));
        assert_eq!(MouseEventKind::from_code(0x20A), MouseEventKind::Wheel);
        assert_eq!(MouseEventKind::from_code(0x2A3), MouseEventKind::Other(0x2A3));
        assert_eq!(MouseEventKind::Other(0x2A3).code(), 0x2A3);
    }
}
