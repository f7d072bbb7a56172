#![forbid(unsafe_code)]

//! Native Unix terminal control for termflow.
//!
//! This crate owns the two pieces of the runtime that touch the terminal
//! device directly: [`TerminalController`] (raw mode and feature toggles)
//! and [`reader::InputReader`] (the background read loop). Unix-first;
//! on other platforms raw mode reports the terminal as unavailable.
//!
//! ## Escape Sequence Reference
//!
//! | Feature           | Enable                 | Disable                |
//! |-------------------|------------------------|------------------------|
//! | Alternate screen  | `CSI ? 1049 h`         | `CSI ? 1049 l`         |
//! | Mouse cell motion | `CSI ? 1002;1006 h`    | `CSI ? 1002;1006 l`    |
//! | Mouse all motion  | `CSI ? 1003;1006 h`    | `CSI ? 1003;1006 l`    |
//! | Bracketed paste   | `CSI ? 2004 h`         | `CSI ? 2004 l`         |
//! | Focus reporting   | `CSI ? 1004 h`         | `CSI ? 1004 l`         |
//! | Cursor show/hide  | `CSI ? 25 h`           | `CSI ? 25 l`           |
//! | Window title      | `OSC 2 ; title BEL`    | —                      |
//!
//! Raw-mode transitions and size queries are the only operations that can
//! fail; every other toggle is a best-effort write that many terminals are
//! free to ignore, so write errors are swallowed (logged at debug level).

use std::fs::File;
use std::io::{self, Write};

use termflow_core::error::{Error, Result};

pub mod reader;

pub use reader::{InputReader, ReadOutcome};

// ── Escape Sequences ─────────────────────────────────────────────────────

const ALT_SCREEN_ENTER: &[u8] = b"\x1b[?1049h";
const ALT_SCREEN_LEAVE: &[u8] = b"\x1b[?1049l";

const CURSOR_SHOW: &[u8] = b"\x1b[?25h";
const CURSOR_HIDE: &[u8] = b"\x1b[?25l";

const MOUSE_CELL_ENABLE: &[u8] = b"\x1b[?1002;1006h";
const MOUSE_CELL_DISABLE: &[u8] = b"\x1b[?1002;1006l";
const MOUSE_ALL_ENABLE: &[u8] = b"\x1b[?1003;1006h";
const MOUSE_ALL_DISABLE: &[u8] = b"\x1b[?1003;1006l";

const BRACKETED_PASTE_ENABLE: &[u8] = b"\x1b[?2004h";
const BRACKETED_PASTE_DISABLE: &[u8] = b"\x1b[?2004l";

const FOCUS_ENABLE: &[u8] = b"\x1b[?1004h";
const FOCUS_DISABLE: &[u8] = b"\x1b[?1004l";

const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
const CURSOR_HOME: &[u8] = b"\x1b[H";
const ERASE_LINE: &[u8] = b"\x1b[2K";

// ── Terminal State ───────────────────────────────────────────────────────

/// Which mouse tracking mode is active. The two motion modes are mutually
/// exclusive; enabling one turns the other off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    /// No mouse reporting.
    #[default]
    Off,
    /// Button presses and drag motion (`CSI ? 1002`).
    CellMotion,
    /// All motion, including hover (`CSI ? 1003`).
    AllMotion,
}

/// Per-controller terminal feature flags.
///
/// Mutated only through [`TerminalController`] operations; each operation is
/// idempotent at the observable level (re-enabling an enabled feature writes
/// nothing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    /// Terminal attributes are in raw mode.
    pub raw_mode: bool,
    /// Alternate screen buffer is active.
    pub alt_screen: bool,
    /// Cursor is visible (terminals default to visible).
    pub cursor_visible: bool,
    /// Active mouse tracking mode.
    pub mouse_mode: MouseMode,
    /// Bracketed paste markers are requested.
    pub bracketed_paste: bool,
    /// Focus in/out reporting is requested.
    pub focus_reporting: bool,
    /// Last title written, if any.
    pub window_title: Option<String>,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self {
            raw_mode: false,
            alt_screen: false,
            cursor_visible: true,
            mouse_mode: MouseMode::Off,
            bracketed_paste: false,
            focus_reporting: false,
            window_title: None,
        }
    }
}

// ── Controller ───────────────────────────────────────────────────────────

/// Owns raw-mode and terminal-feature toggles for one terminal handle.
///
/// The controller writes escape sequences to an injected writer (stdout in
/// production, a byte sink in tests) and tracks every mode it has enabled so
/// [`TerminalController::restore`] can undo them in reverse order. Dropping
/// the controller restores the terminal as well, which keeps a user's shell
/// usable after an abnormal exit.
pub struct TerminalController<W: Write> {
    out: W,
    state: TerminalState,
    /// Terminal device for attribute changes and size queries; `None` when
    /// the process is not attached to a terminal.
    #[cfg(unix)]
    tty: Option<File>,
    /// Termios snapshot taken when raw mode was entered.
    #[cfg(unix)]
    saved_termios: Option<nix::sys::termios::Termios>,
}

impl TerminalController<io::Stdout> {
    /// Controller for the process's controlling terminal, writing escape
    /// sequences to stdout. Construction succeeds even without a terminal;
    /// raw-mode entry and size queries report unavailability instead.
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            state: TerminalState::default(),
            #[cfg(unix)]
            tty: File::open("/dev/tty").ok(),
            #[cfg(unix)]
            saved_termios: None,
        }
    }
}

impl Default for TerminalController<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> TerminalController<W> {
    /// Controller writing to an arbitrary sink, with no terminal device
    /// attached. Used by tests to observe emitted sequences.
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            state: TerminalState::default(),
            #[cfg(unix)]
            tty: None,
            #[cfg(unix)]
            saved_termios: None,
        }
    }

    /// Current feature flags.
    #[must_use]
    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    /// Best-effort escape write; failures are logged and swallowed.
    fn emit(&mut self, seq: &[u8]) {
        if let Err(err) = self.out.write_all(seq).and_then(|()| self.out.flush()) {
            tracing::debug!(?err, "terminal write ignored");
        }
    }

    /// Put the terminal into raw mode, capturing the previous attributes.
    ///
    /// # Errors
    ///
    /// [`Error::TerminalUnavailable`] when not attached to a terminal;
    /// [`Error::Io`] when the attribute change itself fails.
    #[cfg(unix)]
    pub fn enter_raw_mode(&mut self) -> Result<()> {
        use nix::sys::termios::{self, SetArg};

        if self.state.raw_mode {
            return Ok(());
        }
        let tty = self.tty.as_ref().ok_or(Error::TerminalUnavailable)?;
        let original = termios::tcgetattr(tty).map_err(|_| Error::TerminalUnavailable)?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(tty, SetArg::TCSAFLUSH, &raw)
            .map_err(|errno| Error::Io(io::Error::other(errno)))?;

        self.saved_termios = Some(original);
        self.state.raw_mode = true;
        tracing::debug!("raw mode entered");
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn enter_raw_mode(&mut self) -> Result<()> {
        Err(Error::TerminalUnavailable)
    }

    /// Restore the terminal attributes captured at raw-mode entry.
    #[cfg(unix)]
    pub fn exit_raw_mode(&mut self) -> Result<()> {
        use nix::sys::termios::{self, SetArg};

        if !self.state.raw_mode {
            return Ok(());
        }
        let tty = self.tty.as_ref().ok_or(Error::TerminalUnavailable)?;
        if let Some(saved) = self.saved_termios.take() {
            termios::tcsetattr(tty, SetArg::TCSAFLUSH, &saved)
                .map_err(|errno| Error::Io(io::Error::other(errno)))?;
        }
        self.state.raw_mode = false;
        tracing::debug!("raw mode exited");
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn exit_raw_mode(&mut self) -> Result<()> {
        self.state.raw_mode = false;
        Ok(())
    }

    /// Switch to the alternate screen buffer, clearing it and homing the
    /// cursor as terminals expect on entry.
    pub fn enter_alt_screen(&mut self) {
        if self.state.alt_screen {
            return;
        }
        self.emit(ALT_SCREEN_ENTER);
        self.emit(CLEAR_SCREEN);
        self.emit(CURSOR_HOME);
        self.state.alt_screen = true;
    }

    /// Return to the primary screen buffer.
    pub fn exit_alt_screen(&mut self) {
        if !self.state.alt_screen {
            return;
        }
        self.emit(ALT_SCREEN_LEAVE);
        self.state.alt_screen = false;
    }

    /// Hide the cursor.
    pub fn hide_cursor(&mut self) {
        if !self.state.cursor_visible {
            return;
        }
        self.emit(CURSOR_HIDE);
        self.state.cursor_visible = false;
    }

    /// Show the cursor.
    pub fn show_cursor(&mut self) {
        if self.state.cursor_visible {
            return;
        }
        self.emit(CURSOR_SHOW);
        self.state.cursor_visible = true;
    }

    /// Report button presses and drag motion (SGR coordinates).
    pub fn enable_mouse_cell_motion(&mut self) {
        self.set_mouse_mode(MouseMode::CellMotion);
    }

    /// Report all pointer motion, including hover (SGR coordinates).
    pub fn enable_mouse_all_motion(&mut self) {
        self.set_mouse_mode(MouseMode::AllMotion);
    }

    /// Turn off mouse reporting entirely, whichever mode was active.
    pub fn disable_mouse(&mut self) {
        self.set_mouse_mode(MouseMode::Off);
    }

    fn set_mouse_mode(&mut self, mode: MouseMode) {
        if self.state.mouse_mode == mode {
            return;
        }
        // The motion modes are exclusive: drop the old one first.
        match self.state.mouse_mode {
            MouseMode::CellMotion => self.emit(MOUSE_CELL_DISABLE),
            MouseMode::AllMotion => self.emit(MOUSE_ALL_DISABLE),
            MouseMode::Off => {}
        }
        match mode {
            MouseMode::CellMotion => self.emit(MOUSE_CELL_ENABLE),
            MouseMode::AllMotion => self.emit(MOUSE_ALL_ENABLE),
            MouseMode::Off => {}
        }
        self.state.mouse_mode = mode;
    }

    /// Ask the terminal to wrap pasted text in paste markers.
    pub fn enable_bracketed_paste(&mut self) {
        if self.state.bracketed_paste {
            return;
        }
        self.emit(BRACKETED_PASTE_ENABLE);
        self.state.bracketed_paste = true;
    }

    /// Stop requesting paste markers.
    pub fn disable_bracketed_paste(&mut self) {
        if !self.state.bracketed_paste {
            return;
        }
        self.emit(BRACKETED_PASTE_DISABLE);
        self.state.bracketed_paste = false;
    }

    /// Ask the terminal to report focus changes.
    pub fn enable_focus_reporting(&mut self) {
        if self.state.focus_reporting {
            return;
        }
        self.emit(FOCUS_ENABLE);
        self.state.focus_reporting = true;
    }

    /// Stop focus-change reports.
    pub fn disable_focus_reporting(&mut self) {
        if !self.state.focus_reporting {
            return;
        }
        self.emit(FOCUS_DISABLE);
        self.state.focus_reporting = false;
    }

    /// Set the terminal window title.
    pub fn set_window_title(&mut self, title: &str) {
        if self.state.window_title.as_deref() == Some(title) {
            return;
        }
        let mut seq = Vec::with_capacity(title.len() + 5);
        seq.extend_from_slice(b"\x1b]2;");
        seq.extend_from_slice(title.as_bytes());
        seq.push(0x07);
        self.emit(&seq);
        self.state.window_title = Some(title.to_owned());
    }

    /// Erase the whole screen and home the cursor.
    pub fn clear_screen(&mut self) {
        self.emit(CLEAR_SCREEN);
        self.emit(CURSOR_HOME);
    }

    /// Erase the line the cursor is on.
    pub fn erase_line(&mut self) {
        self.emit(ERASE_LINE);
    }

    /// Move the cursor to the top-left corner.
    pub fn cursor_home(&mut self) {
        self.emit(CURSOR_HOME);
    }

    /// Current terminal size as (columns, rows), or `None` when the process
    /// is not attached to a terminal or the query fails.
    #[cfg(unix)]
    #[must_use]
    pub fn size(&self) -> Option<(u16, u16)> {
        let tty = self.tty.as_ref()?;
        let ws = rustix::termios::tcgetwinsize(tty).ok()?;
        (ws.ws_col > 0 && ws.ws_row > 0).then_some((ws.ws_col, ws.ws_row))
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn size(&self) -> Option<(u16, u16)> {
        None
    }

    /// Undo every mode this controller enabled, in reverse order, and exit
    /// raw mode last. Safe to call repeatedly; errors are swallowed.
    pub fn restore(&mut self) {
        self.disable_focus_reporting();
        self.disable_bracketed_paste();
        self.disable_mouse();
        self.show_cursor();
        self.exit_alt_screen();
        let _ = self.exit_raw_mode();
        let _ = self.out.flush();
        tracing::debug!("terminal restored");
    }
}

impl<W: Write> Drop for TerminalController<W> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Whether stdin is attached to a real terminal.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    rustix::termios::isatty(io::stdin())
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TerminalController<Vec<u8>> {
        TerminalController::with_writer(Vec::new())
    }

    fn take_output(c: &mut TerminalController<Vec<u8>>) -> Vec<u8> {
        std::mem::take(&mut c.out)
    }

    #[test]
    fn alt_screen_toggle_is_idempotent() {
        let mut c = controller();

        c.enter_alt_screen();
        assert!(c.state().alt_screen);
        let first = take_output(&mut c);
        assert!(first.starts_with(ALT_SCREEN_ENTER));

        c.enter_alt_screen();
        assert!(take_output(&mut c).is_empty(), "re-enter must write nothing");

        c.exit_alt_screen();
        assert_eq!(take_output(&mut c), ALT_SCREEN_LEAVE);
        c.exit_alt_screen();
        assert!(take_output(&mut c).is_empty());
    }

    #[test]
    fn cursor_defaults_to_visible() {
        let mut c = controller();

        // Showing an already-visible cursor is a no-op.
        c.show_cursor();
        assert!(take_output(&mut c).is_empty());

        c.hide_cursor();
        assert_eq!(take_output(&mut c), CURSOR_HIDE);
        c.hide_cursor();
        assert!(take_output(&mut c).is_empty());

        c.show_cursor();
        assert_eq!(take_output(&mut c), CURSOR_SHOW);
    }

    #[test]
    fn mouse_modes_are_exclusive() {
        let mut c = controller();

        c.enable_mouse_cell_motion();
        assert_eq!(take_output(&mut c), MOUSE_CELL_ENABLE);
        assert_eq!(c.state().mouse_mode, MouseMode::CellMotion);

        // Switching modes drops the old one before enabling the new one.
        c.enable_mouse_all_motion();
        let out = take_output(&mut c);
        let expected = [MOUSE_CELL_DISABLE, MOUSE_ALL_ENABLE].concat();
        assert_eq!(out, expected);

        c.enable_mouse_all_motion();
        assert!(take_output(&mut c).is_empty());

        c.disable_mouse();
        assert_eq!(take_output(&mut c), MOUSE_ALL_DISABLE);
        assert_eq!(c.state().mouse_mode, MouseMode::Off);

        c.disable_mouse();
        assert!(take_output(&mut c).is_empty());
    }

    #[test]
    fn bracketed_paste_and_focus_flags() {
        let mut c = controller();

        c.enable_bracketed_paste();
        c.enable_bracketed_paste();
        c.enable_focus_reporting();
        let out = take_output(&mut c);
        let expected = [BRACKETED_PASTE_ENABLE, FOCUS_ENABLE].concat();
        assert_eq!(out, expected);

        c.disable_bracketed_paste();
        c.disable_focus_reporting();
        let out = take_output(&mut c);
        let expected = [BRACKETED_PASTE_DISABLE, FOCUS_DISABLE].concat();
        assert_eq!(out, expected);
    }

    #[test]
    fn window_title_skips_rewrite_of_same_title() {
        let mut c = controller();

        c.set_window_title("app");
        assert_eq!(take_output(&mut c), b"\x1b]2;app\x07");
        c.set_window_title("app");
        assert!(take_output(&mut c).is_empty());
        c.set_window_title("app2");
        assert_eq!(take_output(&mut c), b"\x1b]2;app2\x07");
    }

    #[test]
    fn raw_mode_without_terminal_is_unavailable() {
        let mut c = controller();
        assert!(matches!(
            c.enter_raw_mode(),
            Err(Error::TerminalUnavailable)
        ));
        assert!(!c.state().raw_mode);
        assert_eq!(c.size(), None);

        // Exiting a mode that was never entered is a clean no-op.
        assert!(c.exit_raw_mode().is_ok());
    }

    #[test]
    fn restore_undoes_in_reverse_order() {
        let mut c = controller();
        c.enter_alt_screen();
        c.hide_cursor();
        c.enable_mouse_cell_motion();
        c.enable_bracketed_paste();
        c.enable_focus_reporting();
        take_output(&mut c);

        c.restore();
        let out = take_output(&mut c);
        let expected = [
            FOCUS_DISABLE,
            BRACKETED_PASTE_DISABLE,
            MOUSE_CELL_DISABLE,
            CURSOR_SHOW,
            ALT_SCREEN_LEAVE,
        ]
        .concat();
        assert_eq!(out, expected);

        // A second restore has nothing left to undo.
        c.restore();
        assert!(take_output(&mut c).is_empty());
    }
}
