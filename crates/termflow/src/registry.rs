#![forbid(unsafe_code)]

//! Handle registry: the arena behind the binding boundary.
//!
//! Host bindings cannot hold Rust references across a language boundary, so
//! live resources are parked in a table keyed by generated `u64` handles.
//! Identifiers are never reused; a freed entry simply stops resolving, which
//! makes a stale handle a clean [`Error::ResourceReleased`] instead of a
//! dangling reference. Handle `0` is never allocated and always denotes "no
//! live resource". Freeing an unknown or already-freed handle is a no-op.
//!
//! One registry serves both resource kinds: programs, and renderers scoped
//! to the program that created them (freeing a program frees its renderers;
//! a renderer can also be freed explicitly).
//!
//! The registry itself is single-threaded; a binding layer that serves
//! multiple host threads wraps it in its own lock.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use termflow_core::error::{Error, Result};
use termflow_core::event::Event;
use termflow_core::parser::Parsed;
use termflow_core::width;
use termflow_render::Renderer;
use termflow_tty::ReadOutcome;

use crate::program::Program;

struct RendererEntry {
    /// Owning program handle; used for cascade free.
    program: u64,
    renderer: Renderer<io::Stdout>,
}

/// Arena of programs and renderers keyed by opaque handles.
pub struct Registry {
    programs: HashMap<u64, Program>,
    renderers: HashMap<u64, RendererEntry>,
    next_id: u64,
}

impl Registry {
    /// An empty registry. The first allocated handle is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
            renderers: HashMap::new(),
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn program_mut(&mut self, handle: u64) -> Result<&mut Program> {
        self.programs
            .get_mut(&handle)
            .ok_or(Error::ResourceReleased(handle))
    }

    fn renderer_mut(&mut self, id: u64) -> Result<&mut Renderer<io::Stdout>> {
        self.renderers
            .get_mut(&id)
            .map(|entry| &mut entry.renderer)
            .ok_or(Error::ResourceReleased(id))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Create a program and return its handle.
    pub fn new_program(&mut self) -> u64 {
        let id = self.alloc_id();
        self.programs.insert(id, Program::new());
        tracing::debug!(handle = id, "program created");
        id
    }

    /// Bind the program to its terminal.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle.
    pub fn init(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.init();
        Ok(())
    }

    /// Release a program and everything it owns. Dropping the [`Program`]
    /// stops its reader and restores the terminal; renderers created under
    /// the handle are freed with it. No-op on a dead handle.
    pub fn free_program(&mut self, handle: u64) {
        self.renderers.retain(|_, entry| entry.program != handle);
        if self.programs.remove(&handle).is_some() {
            tracing::debug!(handle, "program freed");
        }
    }

    // ── Terminal ─────────────────────────────────────────────────────────

    /// Enter raw mode on the program's terminal.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle,
    /// [`Error::TerminalUnavailable`] without a terminal.
    pub fn enter_raw_mode(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enter_raw_mode()
    }

    /// Exit raw mode, restoring the captured attributes.
    ///
    /// # Errors
    ///
    /// As [`Registry::enter_raw_mode`].
    pub fn exit_raw_mode(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().exit_raw_mode()
    }

    /// Switch to the alternate screen buffer.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle (all the toggle
    /// delegates below share this contract).
    pub fn enter_alt_screen(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enter_alt_screen();
        Ok(())
    }

    /// Return to the primary screen buffer.
    pub fn exit_alt_screen(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().exit_alt_screen();
        Ok(())
    }

    /// Hide the cursor.
    pub fn hide_cursor(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().hide_cursor();
        Ok(())
    }

    /// Show the cursor.
    pub fn show_cursor(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().show_cursor();
        Ok(())
    }

    /// Enable button-and-drag mouse reporting.
    pub fn enable_mouse_cell_motion(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enable_mouse_cell_motion();
        Ok(())
    }

    /// Enable all-motion mouse reporting.
    pub fn enable_mouse_all_motion(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enable_mouse_all_motion();
        Ok(())
    }

    /// Disable mouse reporting, whichever mode was active.
    pub fn disable_mouse(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().disable_mouse();
        Ok(())
    }

    /// Enable bracketed paste markers.
    pub fn enable_bracketed_paste(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enable_bracketed_paste();
        Ok(())
    }

    /// Disable bracketed paste markers.
    pub fn disable_bracketed_paste(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().disable_bracketed_paste();
        Ok(())
    }

    /// Enable focus-change reports.
    pub fn enable_focus_reporting(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().enable_focus_reporting();
        Ok(())
    }

    /// Disable focus-change reports.
    pub fn disable_focus_reporting(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().disable_focus_reporting();
        Ok(())
    }

    /// Set the terminal window title.
    pub fn set_window_title(&mut self, handle: u64, title: &str) -> Result<()> {
        self.program_mut(handle)?.terminal().set_window_title(title);
        Ok(())
    }

    /// Current terminal size, or `None` when unavailable.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle.
    pub fn terminal_size(&mut self, handle: u64) -> Result<Option<(u16, u16)>> {
        Ok(self.program_mut(handle)?.terminal().size())
    }

    /// Erase the screen and home the cursor.
    pub fn clear_screen(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().clear_screen();
        Ok(())
    }

    /// Erase the cursor's line.
    pub fn erase_line(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().erase_line();
        Ok(())
    }

    /// Home the cursor.
    pub fn cursor_home(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.terminal().cursor_home();
        Ok(())
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Start the program's background input reader.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle;
    /// [`Error::TerminalUnavailable`] when no input source can be opened.
    pub fn start_reader(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.start_reader()
    }

    /// Stop the program's reader, joining its thread.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle.
    pub fn stop_reader(&mut self, handle: u64) -> Result<()> {
        self.program_mut(handle)?.stop_reader();
        Ok(())
    }

    /// Bounded-wait raw read; timeout is a normal outcome.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle,
    /// [`Error::ReaderStopped`] when the reader is not running.
    pub fn read_raw(
        &mut self,
        handle: u64,
        timeout_ms: u64,
        capacity: usize,
    ) -> Result<ReadOutcome> {
        self.program_mut(handle)?
            .read_raw(Duration::from_millis(timeout_ms), capacity)
    }

    /// Parse one chunk through the program's parser session, returning the
    /// decoded event (if complete) and the byte count consumed.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead handle.
    pub fn parse_with_consumed(&mut self, handle: u64, bytes: &[u8]) -> Result<Parsed> {
        Ok(self.program_mut(handle)?.parse_with_consumed(bytes))
    }

    /// Composed poll: one structured event or `None` on timeout.
    ///
    /// # Errors
    ///
    /// As [`Registry::read_raw`].
    pub fn poll_event(&mut self, handle: u64, timeout_ms: u64) -> Result<Option<Event>> {
        self.program_mut(handle)?
            .poll_event(Duration::from_millis(timeout_ms))
    }

    // ── Render ───────────────────────────────────────────────────────────

    /// Create a renderer owned by `handle` and return its id.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] when the owning program is dead.
    pub fn create_renderer(&mut self, handle: u64) -> Result<u64> {
        if !self.programs.contains_key(&handle) {
            return Err(Error::ResourceReleased(handle));
        }
        let id = self.alloc_id();
        self.renderers.insert(
            id,
            RendererEntry {
                program: handle,
                renderer: Renderer::new(),
            },
        );
        tracing::debug!(handle, renderer = id, "renderer created");
        Ok(id)
    }

    /// Free one renderer. No-op on a dead id.
    pub fn free_renderer(&mut self, id: u64) {
        self.renderers.remove(&id);
    }

    /// Diff-paint a frame; see [`Renderer::render`].
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead id; writer failures as
    /// [`Error::Io`].
    pub fn render(&mut self, id: u64, frame: &str) -> Result<()> {
        self.renderer_mut(id)?.render(frame).map_err(Error::Io)
    }

    /// Declare the renderer's region size.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead id.
    pub fn set_size(&mut self, id: u64, width: u16, height: u16) -> Result<()> {
        self.renderer_mut(id)?.set_size(width, height);
        Ok(())
    }

    /// Declare whether the renderer targets the alternate screen.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead id.
    pub fn set_alt_screen(&mut self, id: u64, enabled: bool) -> Result<()> {
        self.renderer_mut(id)?.set_alt_screen(enabled);
        Ok(())
    }

    /// Erase and forget the stored frame.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceReleased`] on a dead id; writer failures as
    /// [`Error::Io`].
    pub fn clear_renderer(&mut self, id: u64) -> Result<()> {
        self.renderer_mut(id)?.clear().map_err(Error::Io)
    }

    // ── Misc ─────────────────────────────────────────────────────────────

    /// Whether stdin is attached to a real terminal.
    #[must_use]
    pub fn is_tty() -> bool {
        termflow_tty::is_tty()
    }

    /// Display width of `text` in terminal cells.
    #[must_use]
    pub fn string_width(text: &str) -> usize {
        width::string_width(text)
    }

    /// Truncate `text` to `max_width` cells, preserving escape sequences.
    #[must_use]
    pub fn truncate(text: &str, max_width: usize) -> String {
        width::truncate(text, max_width)
    }

    /// Version of the engine the bindings are wrapping.
    #[must_use]
    pub fn upstream_version() -> &'static str {
        termflow_core::upstream_version()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_start_at_one_and_never_reuse() {
        let mut reg = Registry::new();
        let a = reg.new_program();
        let b = reg.new_program();
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        reg.free_program(a);
        let c = reg.new_program();
        assert!(c > b, "freed ids must not be reused");
    }

    #[test]
    fn zero_is_never_a_live_handle() {
        let mut reg = Registry::new();
        assert!(matches!(reg.init(0), Err(Error::ResourceReleased(0))));
        reg.free_program(0); // no-op
    }

    #[test]
    fn double_free_is_a_noop() {
        let mut reg = Registry::new();
        let h = reg.new_program();
        reg.free_program(h);
        reg.free_program(h);
        assert!(matches!(
            reg.init(h),
            Err(Error::ResourceReleased(handle)) if handle == h
        ));
    }

    #[test]
    fn operations_on_freed_handles_fail_cleanly() {
        let mut reg = Registry::new();
        let h = reg.new_program();
        reg.free_program(h);

        assert!(matches!(
            reg.enter_raw_mode(h),
            Err(Error::ResourceReleased(_))
        ));
        assert!(matches!(
            reg.read_raw(h, 0, 16),
            Err(Error::ResourceReleased(_))
        ));
        assert!(matches!(
            reg.create_renderer(h),
            Err(Error::ResourceReleased(_))
        ));
    }

    #[test]
    fn renderers_are_freed_with_their_program() {
        let mut reg = Registry::new();
        let h = reg.new_program();
        let r = reg.create_renderer(h).unwrap();
        assert!(reg.set_size(r, 80, 24).is_ok());

        reg.free_program(h);
        assert!(matches!(
            reg.set_size(r, 80, 24),
            Err(Error::ResourceReleased(_))
        ));
    }

    #[test]
    fn renderer_can_be_freed_explicitly() {
        let mut reg = Registry::new();
        let h = reg.new_program();
        let r = reg.create_renderer(h).unwrap();
        reg.free_renderer(r);
        reg.free_renderer(r); // no-op
        assert!(matches!(
            reg.set_alt_screen(r, true),
            Err(Error::ResourceReleased(_))
        ));
        // The program itself is untouched.
        assert!(reg.init(h).is_ok());
    }

    #[test]
    fn parse_goes_through_the_program_session() {
        let mut reg = Registry::new();
        let h = reg.new_program();

        let parsed = reg.parse_with_consumed(h, b"\x1b[1;5A").unwrap();
        assert_eq!(parsed.consumed, 6);
        assert!(matches!(parsed.event, Some(Event::Key(_))));

        // Paste state spans calls within one program session.
        let parsed = reg.parse_with_consumed(h, b"\x1b[200~abc").unwrap();
        assert_eq!((parsed.event, parsed.consumed), (None, 9));
        let parsed = reg.parse_with_consumed(h, b"\x1b[201~").unwrap();
        assert_eq!(parsed.event, Some(Event::Paste("abc".into())));
    }

    #[test]
    fn read_without_started_reader_is_reader_stopped() {
        let mut reg = Registry::new();
        let h = reg.new_program();
        assert!(matches!(reg.read_raw(h, 0, 16), Err(Error::ReaderStopped)));
    }

    #[test]
    fn misc_delegates() {
        assert_eq!(Registry::string_width("日本"), 4);
        assert_eq!(Registry::truncate("abcdef", 2), "ab");
        assert!(!Registry::upstream_version().is_empty());
    }
}
