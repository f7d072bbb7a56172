#![forbid(unsafe_code)]

//! Escape-sequence parser: raw terminal bytes → [`Event`] values.
//!
//! The parser is a prefix-matching state machine over the terminal input
//! protocol. [`EventParser::parse`] consumes the longest well-formed prefix
//! of the buffer and returns at most one event plus the number of bytes
//! consumed; the caller keeps the unconsumed tail and prepends it to the
//! next chunk. Handled sequence classes:
//!
//! - ASCII characters and control codes
//! - UTF-8 multi-byte sequences, decoded as a unit
//! - CSI sequences: cursor keys, `~`-keys, focus reports, paste brackets
//! - SS3 sequences (F1-F4, application-mode cursor keys)
//! - Mouse reports in SGR and legacy X10 encodings
//! - OSC sequences (consumed, surfaced as [`Event::Unknown`])
//!
//! # Prefix Rule
//!
//! The parser never consumes bytes belonging to a sequence it cannot yet
//! fully classify. A buffer ending mid-sequence yields `consumed: 0` for
//! that sequence; the caller re-invokes with more bytes appended. A
//! complete-but-unrecognized sequence yields [`Event::Unknown`] with its
//! bytes consumed, so no input is ever invisibly lost.
//!
//! The one deliberate exception to "no event, no consumption" is bracketed
//! paste: content between the paste markers is consumed into session state
//! with no event until the end marker arrives, because paste bodies can
//! span many reads and would otherwise pin the whole paste in the caller's
//! residue buffer.
//!
//! # Length Limits
//!
//! Sequence lengths are capped to prevent memory exhaustion from hostile
//! input: CSI 256 bytes, OSC 4 KB, paste content 1 MB. A capped sequence is
//! surfaced as [`Event::Unknown`] rather than stalling the stream.

use memchr::memchr;

use crate::event::{Event, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent};

/// Maximum CSI sequence length.
const MAX_CSI_LEN: usize = 256;

/// Maximum OSC sequence length.
const MAX_OSC_LEN: usize = 4096;

/// Maximum accumulated paste content length.
const MAX_PASTE_LEN: usize = 1024 * 1024;

/// Bracketed paste terminator: `CSI 201 ~`.
const PASTE_END: &[u8] = b"\x1b[201~";

/// Result of one [`EventParser::parse`] call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Parsed {
    /// The decoded event, if the buffer held a complete one.
    pub event: Option<Event>,

    /// How many bytes of the input buffer were consumed. Zero with no event
    /// means "incomplete sequence, call again with more bytes".
    pub consumed: usize,
}

/// Outcome of classifying the bytes at the front of the buffer.
enum Step {
    /// The buffer ends mid-sequence; consume nothing and wait for more.
    Incomplete,
    /// `n` bytes were absorbed into session state (paste accumulation)
    /// without producing an event.
    Progress(usize),
    /// A complete event spanning `n` bytes.
    Emit(Event, usize),
}

/// Stateful escape-sequence decoder.
///
/// The only state retained between calls is bracketed-paste accumulation;
/// everything else is derived from the buffer on each call, which is what
/// makes the split-invariance property hold (parsing a byte stream yields
/// the same events regardless of how it was chunked).
#[derive(Debug, Default)]
pub struct EventParser {
    /// Accumulated paste content while inside bracketed-paste markers.
    paste: Option<Vec<u8>>,
}

impl EventParser {
    /// Create a new parser session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the longest well-formed prefix of `input`.
    ///
    /// Returns at most one event. `consumed` may be non-zero even with no
    /// event (paste accumulation); `consumed == 0` with no event means the
    /// buffer ends mid-sequence.
    pub fn parse(&mut self, input: &[u8]) -> Parsed {
        let mut consumed = 0;
        while consumed < input.len() {
            match self.step(&input[consumed..]) {
                Step::Incomplete => break,
                Step::Progress(n) => {
                    debug_assert!(n > 0, "progress must consume bytes");
                    consumed += n;
                }
                Step::Emit(event, n) => {
                    return Parsed {
                        event: Some(event),
                        consumed: consumed + n,
                    };
                }
            }
        }
        Parsed {
            event: None,
            consumed,
        }
    }

    /// Classify the bytes at the front of `rest`.
    fn step(&mut self, rest: &[u8]) -> Step {
        if let Some(buf) = self.paste.take() {
            return self.step_paste(buf, rest);
        }
        match rest[0] {
            0x1b => self.step_escape(rest),
            b @ 0x00..=0x1f => Step::Emit(control_key(b), 1),
            0x7f => Step::Emit(Event::Key(KeyEvent::new(KeyCode::Backspace)), 1),
            b @ 0x20..=0x7e => {
                Step::Emit(Event::Key(KeyEvent::new(KeyCode::Char(b as char))), 1)
            }
            _ => step_utf8(rest),
        }
    }

    /// Accumulate paste content until the end marker arrives.
    ///
    /// Takes the buffer by value and puts it back unless the paste
    /// completed, which keeps the borrow on `self.paste` simple.
    fn step_paste(&mut self, mut buf: Vec<u8>, rest: &[u8]) -> Step {
        if let Some(pos) = find_subsequence(rest, PASTE_END) {
            absorb_capped(&mut buf, &rest[..pos]);
            let text = String::from_utf8_lossy(&buf).into_owned();
            return Step::Emit(Event::Paste(text), pos + PASTE_END.len());
        }

        // Keep any trailing prefix of the end marker unconsumed so it can
        // complete on the next call.
        let safe = rest.len() - trailing_marker_prefix(rest, PASTE_END);
        if safe == 0 {
            self.paste = Some(buf);
            return Step::Incomplete;
        }
        absorb_capped(&mut buf, &rest[..safe]);
        self.paste = Some(buf);
        Step::Progress(safe)
    }

    /// Classify a sequence starting with ESC.
    fn step_escape(&mut self, rest: &[u8]) -> Step {
        if rest.len() < 2 {
            return Step::Incomplete;
        }
        match rest[1] {
            b'[' => self.step_csi(rest),
            b'O' => step_ss3(rest),
            b']' => step_osc(rest),
            b @ 0x20..=0x7e => Step::Emit(
                Event::Key(KeyEvent::new(KeyCode::Char(b as char)).with_modifiers(Modifiers::ALT)),
                2,
            ),
            // ESC followed by a byte that introduces nothing: a bare Escape
            // key press, leaving the follower for the next step.
            _ => Step::Emit(Event::Key(KeyEvent::new(KeyCode::Escape)), 1),
        }
    }

    /// Classify a CSI sequence (`ESC [` ...).
    fn step_csi(&mut self, rest: &[u8]) -> Step {
        if rest.len() < 3 {
            return Step::Incomplete;
        }

        // Legacy X10 mouse report: CSI M followed by three raw bytes.
        if rest[2] == b'M' {
            if rest.len() < 6 {
                return Step::Incomplete;
            }
            return Step::Emit(decode_x10_mouse(rest[3], rest[4], rest[5]), 6);
        }

        // Scan parameter and intermediate bytes up to the final byte.
        let mut i = 2;
        while i < rest.len() && (0x20..=0x3f).contains(&rest[i]) {
            i += 1;
            if i - 2 > MAX_CSI_LEN {
                // Runaway sequence: flush what we have so the stream moves.
                return Step::Emit(Event::Unknown(rest[..i].to_vec()), i);
            }
        }
        if i == rest.len() {
            return Step::Incomplete;
        }
        let final_byte = rest[i];
        if !(0x40..=0x7e).contains(&final_byte) {
            // Not a valid CSI final byte; surface the malformed prefix.
            return Step::Emit(Event::Unknown(rest[..=i].to_vec()), i + 1);
        }

        let params = &rest[2..i];
        let consumed = i + 1;

        match (params, final_byte) {
            ([], b'I') => return Step::Emit(Event::Focus(true), consumed),
            ([], b'O') => return Step::Emit(Event::Focus(false), consumed),
            (b"200", b'~') => {
                self.paste = Some(Vec::new());
                return Step::Progress(consumed);
            }
            _ if params.first() == Some(&b'<') && matches!(final_byte, b'M' | b'm') => {
                return match decode_sgr_mouse(&params[1..], final_byte) {
                    Some(event) => Step::Emit(event, consumed),
                    None => Step::Emit(Event::Unknown(rest[..consumed].to_vec()), consumed),
                };
            }
            _ => {}
        }

        let modifiers = csi_modifiers(params);
        let event = match final_byte {
            b'A' => arrow(KeyCode::Up, modifiers),
            b'B' => arrow(KeyCode::Down, modifiers),
            b'C' => arrow(KeyCode::Right, modifiers),
            b'D' => arrow(KeyCode::Left, modifiers),
            b'H' => arrow(KeyCode::Home, modifiers),
            b'F' => arrow(KeyCode::End, modifiers),
            b'Z' => Some(Event::Key(
                KeyEvent::new(KeyCode::Tab).with_modifiers(Modifiers::SHIFT),
            )),
            b'~' => tilde_key(params).map(|code| {
                Event::Key(KeyEvent::new(code).with_modifiers(modifiers))
            }),
            _ => None,
        };
        match event {
            Some(event) => Step::Emit(event, consumed),
            None => Step::Emit(Event::Unknown(rest[..consumed].to_vec()), consumed),
        }
    }
}

/// Map a C0 control byte to its conventional key event.
fn control_key(b: u8) -> Event {
    let key = match b {
        0x00 => KeyEvent::new(KeyCode::Char(' ')).with_modifiers(Modifiers::CTRL),
        0x09 => KeyEvent::new(KeyCode::Tab),
        0x0d => KeyEvent::new(KeyCode::Enter),
        0x01..=0x1a => {
            KeyEvent::new(KeyCode::Char((b'a' + b - 1) as char)).with_modifiers(Modifiers::CTRL)
        }
        0x1c => KeyEvent::new(KeyCode::Char('\\')).with_modifiers(Modifiers::CTRL),
        0x1d => KeyEvent::new(KeyCode::Char(']')).with_modifiers(Modifiers::CTRL),
        0x1e => KeyEvent::new(KeyCode::Char('^')).with_modifiers(Modifiers::CTRL),
        0x1f => KeyEvent::new(KeyCode::Char('_')).with_modifiers(Modifiers::CTRL),
        // 0x1b is handled by the escape path before this function is called.
        _ => KeyEvent::new(KeyCode::Escape),
    };
    Event::Key(key)
}

/// Decode a UTF-8 sequence at the front of `rest`.
fn step_utf8(rest: &[u8]) -> Step {
    let len = match rest[0] {
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        // Stray continuation or invalid lead byte.
        _ => return Step::Emit(Event::Unknown(vec![rest[0]]), 1),
    };
    if rest.len() < len {
        return Step::Incomplete;
    }
    match std::str::from_utf8(&rest[..len]) {
        Ok(s) => {
            let c = s.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
            Step::Emit(Event::Key(KeyEvent::new(KeyCode::Char(c))), len)
        }
        // Invalid continuation: flush the lead byte and re-sync.
        Err(_) => Step::Emit(Event::Unknown(vec![rest[0]]), 1),
    }
}

/// Classify an SS3 sequence (`ESC O` + one byte).
fn step_ss3(rest: &[u8]) -> Step {
    if rest.len() < 3 {
        return Step::Incomplete;
    }
    let code = match rest[2] {
        b'P' => Some(KeyCode::F(1)),
        b'Q' => Some(KeyCode::F(2)),
        b'R' => Some(KeyCode::F(3)),
        b'S' => Some(KeyCode::F(4)),
        b'A' => Some(KeyCode::Up),
        b'B' => Some(KeyCode::Down),
        b'C' => Some(KeyCode::Right),
        b'D' => Some(KeyCode::Left),
        b'H' => Some(KeyCode::Home),
        b'F' => Some(KeyCode::End),
        _ => None,
    };
    match code {
        Some(code) => Step::Emit(Event::Key(KeyEvent::new(code)), 3),
        None => Step::Emit(Event::Unknown(rest[..3].to_vec()), 3),
    }
}

/// Consume an OSC sequence (`ESC ]` ... `BEL` or `ESC \`).
///
/// Terminals rarely send OSC on the input stream (OSC 52 clipboard replies
/// are the main case); the sequence is consumed whole and surfaced as
/// [`Event::Unknown`] so the host can inspect it if it cares.
fn step_osc(rest: &[u8]) -> Step {
    let mut i = 2;
    while i < rest.len() {
        match rest[i] {
            0x07 => return Step::Emit(Event::Unknown(rest[..=i].to_vec()), i + 1),
            0x1b => {
                if i + 1 == rest.len() {
                    return Step::Incomplete;
                }
                if rest[i + 1] == b'\\' {
                    return Step::Emit(Event::Unknown(rest[..i + 2].to_vec()), i + 2);
                }
                i += 2;
            }
            _ => i += 1,
        }
        if i > MAX_OSC_LEN {
            return Step::Emit(Event::Unknown(rest[..i].to_vec()), i);
        }
    }
    Step::Incomplete
}

fn arrow(code: KeyCode, modifiers: Modifiers) -> Option<Event> {
    Some(Event::Key(KeyEvent::new(code).with_modifiers(modifiers)))
}

/// Keys reported as `CSI <num> ~`.
fn tilde_key(params: &[u8]) -> Option<KeyCode> {
    match first_param(params)? {
        1 => Some(KeyCode::Home),
        2 => Some(KeyCode::Insert),
        3 => Some(KeyCode::Delete),
        4 => Some(KeyCode::End),
        5 => Some(KeyCode::PageUp),
        6 => Some(KeyCode::PageDown),
        15 => Some(KeyCode::F(5)),
        17 => Some(KeyCode::F(6)),
        18 => Some(KeyCode::F(7)),
        19 => Some(KeyCode::F(8)),
        20 => Some(KeyCode::F(9)),
        21 => Some(KeyCode::F(10)),
        23 => Some(KeyCode::F(11)),
        24 => Some(KeyCode::F(12)),
        _ => None,
    }
}

/// First semicolon-separated numeric parameter.
fn first_param(params: &[u8]) -> Option<u32> {
    let s = std::str::from_utf8(params).ok()?;
    s.split(';').next()?.parse().ok()
}

/// Modifier encoding shared by xterm-style CSI sequences: the second
/// parameter is `1 + bits`, with shift=1, alt=2, ctrl=4.
fn csi_modifiers(params: &[u8]) -> Modifiers {
    let Ok(s) = std::str::from_utf8(params) else {
        return Modifiers::NONE;
    };
    let value: u32 = s
        .split(';')
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    modifiers_from_xterm(value)
}

fn modifiers_from_xterm(value: u32) -> Modifiers {
    let bits = value.saturating_sub(1);
    let mut mods = Modifiers::NONE;
    if bits & 1 != 0 {
        mods |= Modifiers::SHIFT;
    }
    if bits & 2 != 0 {
        mods |= Modifiers::ALT;
    }
    if bits & 4 != 0 {
        mods |= Modifiers::CTRL;
    }
    mods
}

/// Decode an SGR mouse report: `CSI < button ; x ; y M|m`.
fn decode_sgr_mouse(params: &[u8], final_byte: u8) -> Option<Event> {
    let s = std::str::from_utf8(params).ok()?;
    let mut parts = s.split(';');
    let code: u16 = parts.next()?.parse().ok()?;
    let x: u16 = parts.next()?.parse().ok()?;
    let y: u16 = parts.next()?.parse().ok()?;

    let (button, modifiers, motion) = decode_mouse_button(code);
    let action = if final_byte == b'm' {
        MouseAction::Release
    } else if motion {
        MouseAction::Motion
    } else {
        MouseAction::Press
    };

    Some(Event::Mouse(MouseEvent {
        x: x.saturating_sub(1),
        y: y.saturating_sub(1),
        button,
        action,
        modifiers,
    }))
}

/// Decode a legacy X10 mouse report: `CSI M` + button, x, y bytes.
fn decode_x10_mouse(b: u8, x: u8, y: u8) -> Event {
    let code = u16::from(b.wrapping_sub(32));
    let (button, modifiers, motion) = decode_mouse_button(code);
    let action = if code & 0b11 == 3 && code & 64 == 0 {
        // X10 encodes "release" as button bits 3 with no wheel flag.
        MouseAction::Release
    } else if motion {
        MouseAction::Motion
    } else {
        MouseAction::Press
    };
    Event::Mouse(MouseEvent {
        x: u16::from(x.saturating_sub(33)),
        y: u16::from(y.saturating_sub(33)),
        button,
        action,
        modifiers,
    })
}

/// Shared button-bitfield decoding for both mouse encodings.
///
/// Returns (button, modifiers, motion-flag).
fn decode_mouse_button(code: u16) -> (MouseButton, Modifiers, bool) {
    let mut mods = Modifiers::NONE;
    if code & 4 != 0 {
        mods |= Modifiers::SHIFT;
    }
    if code & 8 != 0 {
        mods |= Modifiers::ALT;
    }
    if code & 16 != 0 {
        mods |= Modifiers::CTRL;
    }

    let button = if code & 64 != 0 {
        match code & 0b11 {
            0 => MouseButton::WheelUp,
            1 => MouseButton::WheelDown,
            _ => MouseButton::None,
        }
    } else {
        match code & 0b11 {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::None,
        }
    };

    (button, mods, code & 32 != 0)
}

/// Find `needle` in `haystack`, scanning ESC positions only.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while let Some(pos) = memchr(0x1b, &haystack[offset..]) {
        let start = offset + pos;
        if haystack[start..].starts_with(needle) {
            return Some(start);
        }
        if haystack.len() - start < needle.len()
            && needle.starts_with(&haystack[start..])
        {
            // A partial match at the tail cannot be ruled out yet.
            return None;
        }
        offset = start + 1;
    }
    None
}

/// Length of the longest strict prefix of `marker` that `bytes` ends with.
fn trailing_marker_prefix(bytes: &[u8], marker: &[u8]) -> usize {
    let max = marker.len().min(bytes.len());
    for k in (1..=max).rev() {
        if bytes.ends_with(&marker[..k]) {
            return k;
        }
    }
    0
}

/// Append to the paste buffer, silently capping at [`MAX_PASTE_LEN`].
fn absorb_capped(buf: &mut Vec<u8>, bytes: &[u8]) {
    let room = MAX_PASTE_LEN.saturating_sub(buf.len());
    buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
}
