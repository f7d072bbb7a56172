#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! Every event the runtime can produce is a variant of [`Event`]. The set is
//! closed and exhaustive so hosts can match on it without a fallback arm for
//! "some event kind added later"; genuinely unclassifiable terminal input is
//! represented explicitly by [`Event::Unknown`] rather than dropped.
//!
//! All payload types derive `serde::{Serialize, Deserialize}`. The core never
//! picks a wire format; the derives exist so a binding layer can serialize
//! events into whatever its host language consumes.
//!
//! # Design Notes
//!
//! - Mouse coordinates are 0-indexed (the terminal wire formats are 1-indexed)
//! - `Modifiers` use bitflags for easy combination
//! - `Event` ownership transfers to the caller of poll; nothing is retained

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Canonical input event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A keyboard event.
    Key(KeyEvent),

    /// A mouse event.
    Mouse(MouseEvent),

    /// Terminal was resized.
    Resize {
        /// New terminal width in columns.
        width: u16,
        /// New terminal height in rows.
        height: u16,
    },

    /// Focus gained (`true`) or lost (`false`).
    Focus(bool),

    /// Text delivered through bracketed paste mode.
    Paste(String),

    /// A complete escape sequence the parser could not classify.
    ///
    /// The raw bytes are preserved so no input is ever invisibly lost.
    Unknown(Vec<u8>),
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// The key that was pressed.
    pub code: KeyCode,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a new key event with no modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
        }
    }

    /// Attach modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Check if this is a specific character key.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }

    /// Check if Ctrl is held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Check if Alt is held.
    #[must_use]
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Conventional human-readable chord name: `"ctrl+c"`, `"alt+x"`,
    /// `"shift+tab"`, `"f5"`, `"space"`, or the character itself.
    #[must_use]
    pub fn name(&self) -> String {
        let mut out = String::new();
        if self.modifiers.contains(Modifiers::CTRL) {
            out.push_str("ctrl+");
        }
        if self.modifiers.contains(Modifiers::ALT) {
            out.push_str("alt+");
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            out.push_str("shift+");
        }
        match self.code {
            KeyCode::Char(' ') => out.push_str("space"),
            KeyCode::Char(c) => out.push(c),
            KeyCode::F(n) => {
                out.push('f');
                out.push_str(&n.to_string());
            }
            code => out.push_str(code.base_name()),
        }
        out
    }
}

/// Key codes for keyboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    /// A regular character key (any Unicode scalar, decoded from UTF-8).
    Char(char),

    /// Enter/Return key.
    Enter,

    /// Escape key.
    Escape,

    /// Backspace key.
    Backspace,

    /// Tab key. Shift+Tab arrives as `Tab` with [`Modifiers::SHIFT`].
    Tab,

    /// Delete key.
    Delete,

    /// Insert key.
    Insert,

    /// Home key.
    Home,

    /// End key.
    End,

    /// Page Up key.
    PageUp,

    /// Page Down key.
    PageDown,

    /// Up arrow key.
    Up,

    /// Down arrow key.
    Down,

    /// Left arrow key.
    Left,

    /// Right arrow key.
    Right,

    /// Function key (F1-F12).
    F(u8),
}

impl KeyCode {
    fn base_name(self) -> &'static str {
        match self {
            KeyCode::Enter => "enter",
            KeyCode::Escape => "esc",
            KeyCode::Backspace => "backspace",
            KeyCode::Tab => "tab",
            KeyCode::Delete => "delete",
            KeyCode::Insert => "insert",
            KeyCode::Home => "home",
            KeyCode::End => "end",
            KeyCode::PageUp => "pgup",
            KeyCode::PageDown => "pgdown",
            KeyCode::Up => "up",
            KeyCode::Down => "down",
            KeyCode::Left => "left",
            KeyCode::Right => "right",
            KeyCode::Char(_) | KeyCode::F(_) => "",
        }
    }
}

bitflags! {
    /// Modifier keys that can be held during a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseEvent {
    /// X coordinate (0-indexed, leftmost column is 0).
    pub x: u16,

    /// Y coordinate (0-indexed, topmost row is 0).
    pub y: u16,

    /// Which button the event refers to.
    pub button: MouseButton,

    /// What happened.
    pub action: MouseAction,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    /// No button (pure motion reports).
    None,

    /// Left mouse button.
    Left,

    /// Middle mouse button (scroll wheel click).
    Middle,

    /// Right mouse button.
    Right,

    /// Scroll wheel rolled up.
    WheelUp,

    /// Scroll wheel rolled down.
    WheelDown,
}

/// What a mouse event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseAction {
    /// Button pressed (wheel events always report as presses).
    Press,

    /// Button released.
    Release,

    /// Pointer moved, with or without a button held.
    Motion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_follow_convention() {
        assert_eq!(KeyEvent::new(KeyCode::Char('q')).name(), "q");
        assert_eq!(
            KeyEvent::new(KeyCode::Char('c'))
                .with_modifiers(Modifiers::CTRL)
                .name(),
            "ctrl+c"
        );
        assert_eq!(
            KeyEvent::new(KeyCode::Char('x'))
                .with_modifiers(Modifiers::ALT)
                .name(),
            "alt+x"
        );
        assert_eq!(
            KeyEvent::new(KeyCode::Tab)
                .with_modifiers(Modifiers::SHIFT)
                .name(),
            "shift+tab"
        );
        assert_eq!(KeyEvent::new(KeyCode::Char(' ')).name(), "space");
        assert_eq!(KeyEvent::new(KeyCode::F(5)).name(), "f5");
        assert_eq!(KeyEvent::new(KeyCode::Escape).name(), "esc");
    }

    #[test]
    fn modifier_order_is_stable() {
        let ev = KeyEvent::new(KeyCode::Up)
            .with_modifiers(Modifiers::CTRL | Modifiers::SHIFT | Modifiers::ALT);
        assert_eq!(ev.name(), "ctrl+alt+shift+up");
    }

    #[test]
    fn events_round_trip_through_json() {
        let samples = vec![
            Event::Key(KeyEvent::new(KeyCode::Char('é')).with_modifiers(Modifiers::ALT)),
            Event::Mouse(MouseEvent {
                x: 4,
                y: 9,
                button: MouseButton::WheelDown,
                action: MouseAction::Press,
                modifiers: Modifiers::CTRL,
            }),
            Event::Resize {
                width: 120,
                height: 40,
            },
            Event::Focus(false),
            Event::Paste("hello\nworld".into()),
            Event::Unknown(vec![0x1b, b'[', b'9', b'9', b'~']),
        ];
        for event in samples {
            let json = serde_json::to_string(&event).unwrap();
            let back: Event = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }
}
