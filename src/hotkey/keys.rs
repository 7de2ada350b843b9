//! Key canonicalization
//!
//! Turns the raw virtual keycode and modifier flag word delivered by the
//! event tap into a [`Hotkey`] that can be compared against configuration.

use std::borrow::Cow;
use std::fmt;

/// Modifier flag masks, bit-compatible with macOS CGEventFlags
pub mod flags {
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
}

/// One of the four modifiers a hotkey can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Ctrl,
    Alt,
    Cmd,
}

impl Modifier {
    /// All modifiers in display order
    pub const ALL: [Modifier; 4] = [Modifier::Shift, Modifier::Ctrl, Modifier::Alt, Modifier::Cmd];

    fn bit(self) -> u8 {
        match self {
            Modifier::Shift => 0b0001,
            Modifier::Ctrl => 0b0010,
            Modifier::Alt => 0b0100,
            Modifier::Cmd => 0b1000,
        }
    }

    fn flag(self) -> u64 {
        match self {
            Modifier::Shift => flags::SHIFT,
            Modifier::Ctrl => flags::CONTROL,
            Modifier::Alt => flags::OPTION,
            Modifier::Cmd => flags::COMMAND,
        }
    }

    /// Canonical token used in configuration and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Shift => "shift",
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Cmd => "cmd",
        }
    }

    /// Parse a configuration token, accepting the long macOS names as aliases
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "shift" => Some(Modifier::Shift),
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "opt" | "option" => Some(Modifier::Alt),
            "cmd" | "command" => Some(Modifier::Cmd),
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unordered set of modifiers
///
/// Stored as a bitset, so `{cmd, shift}` and `{shift, cmd}` are the same
/// value and hash identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Decode the modifier bits of a raw event flag word; other bits are ignored
    pub fn from_flags(raw: u64) -> Self {
        Modifier::ALL
            .into_iter()
            .filter(|m| raw & m.flag() != 0)
            .collect()
    }

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate in display order
    pub fn iter(self) -> impl Iterator<Item = Modifier> {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = Modifiers::empty();
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, modifier) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            f.write_str(modifier.as_str())?;
        }
        Ok(())
    }
}

/// A canonical global shortcut: modifier set plus one key token
///
/// Rendered in configuration syntax, e.g. `shift+cmd-space`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hotkey {
    modifiers: Modifiers,
    key: Cow<'static, str>,
}

impl Hotkey {
    /// Build a hotkey from a configured key token; the token is lower-cased
    pub fn new(modifiers: Modifiers, key: &str) -> Self {
        Self {
            modifiers,
            key: Cow::Owned(key.to_ascii_lowercase()),
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            f.write_str(&self.key)
        } else {
            write!(f, "{}-{}", self.modifiers, self.key)
        }
    }
}

/// Canonicalize a raw key-down event
///
/// Never fails: keycodes outside the table become `unknown(<code>)`.
pub fn canonicalize(keycode: u16, raw_flags: u64) -> Hotkey {
    let key = match key_name(keycode) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("unknown({keycode})")),
    };
    Hotkey {
        modifiers: Modifiers::from_flags(raw_flags),
        key,
    }
}

/// Name of an ANSI-layout macOS virtual keycode
pub fn key_name(keycode: u16) -> Option<&'static str> {
    let name = match keycode {
        0 => "a",
        1 => "s",
        2 => "d",
        3 => "f",
        4 => "h",
        5 => "g",
        6 => "z",
        7 => "x",
        8 => "c",
        9 => "v",
        11 => "b",
        12 => "q",
        13 => "w",
        14 => "e",
        15 => "r",
        16 => "y",
        17 => "t",
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        22 => "6",
        23 => "5",
        24 => "=",
        25 => "9",
        26 => "7",
        27 => "-",
        28 => "8",
        29 => "0",
        30 => "]",
        31 => "o",
        32 => "u",
        33 => "[",
        34 => "i",
        35 => "p",
        36 => "return",
        37 => "l",
        38 => "j",
        39 => "'",
        40 => "k",
        41 => ";",
        42 => "\\",
        43 => ",",
        44 => "/",
        45 => "n",
        46 => "m",
        47 => ".",
        48 => "tab",
        49 => "space",
        50 => "`",
        51 => "delete",
        53 => "escape",
        // Function keys
        122 => "f1",
        120 => "f2",
        99 => "f3",
        118 => "f4",
        96 => "f5",
        97 => "f6",
        98 => "f7",
        100 => "f8",
        101 => "f9",
        109 => "f10",
        103 => "f11",
        111 => "f12",
        // Arrows
        123 => "left",
        124 => "right",
        125 => "down",
        126 => "up",
        _ => return None,
    };
    Some(name)
}
