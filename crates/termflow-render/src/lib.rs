#![forbid(unsafe_code)]

//! Line-diffing frame renderer.
//!
//! A [`Renderer`] owns the previously painted frame and, on each
//! [`Renderer::render`] call, emits the smallest escape/control stream that
//! turns the screen into the new frame:
//!
//! - an unchanged frame emits nothing at all;
//! - otherwise lines are diffed one by one: unchanged lines are skipped,
//!   changed lines are rewritten in place, trailing removed lines are
//!   erased;
//! - the first paint, a declared size change, an alt-screen toggle, and
//!   [`Renderer::clear`] all force a full repaint (a width change makes
//!   every stored line's truncation stale, so partial diffing would lie).
//!
//! Positioning differs by screen: on the alternate screen rows are
//! addressed absolutely (`CSI row ; 1 H`), inline the renderer moves
//! relative to where the previous paint left the cursor (column 0 of the
//! last painted line), preserving the scrollback above the UI region.
//!
//! All output goes through an injected writer, buffered per frame into a
//! single `write_all`, so tests observe exact bytes and a paint is one
//! terminal write.

use std::io::{self, Write};

use termflow_core::width::truncate;

const CURSOR_HOME: &[u8] = b"\x1b[H";
const CLEAR_SCREEN: &[u8] = b"\x1b[2J";

/// Erase from the cursor to the end of the line: `CSI K`.
const ERASE_TO_EOL: &[u8] = b"\x1b[K";

/// Erase the entire line: `CSI 2 K`.
const ERASE_LINE: &[u8] = b"\x1b[2K";

fn cursor_up(buf: &mut Vec<u8>, n: usize) {
    if n > 0 {
        buf.extend_from_slice(format!("\x1b[{n}A").as_bytes());
    }
}

fn cursor_row(buf: &mut Vec<u8>, row: usize) {
    buf.extend_from_slice(format!("\x1b[{row};1H").as_bytes());
}

/// Paints frames to one region of one terminal, diffing against the frame
/// it painted last.
pub struct Renderer<W: Write> {
    out: W,
    /// The exact frame text of the previous paint (pre-truncation), used
    /// for the cheap "nothing changed" test.
    last_frame: Option<String>,
    /// Truncated lines as they stand on screen.
    last_lines: Vec<String>,
    /// Rows the previous paint occupied.
    lines_rendered: usize,
    /// Declared region size; zero means unbounded.
    width: u16,
    height: u16,
    alt_screen: bool,
    /// Next render must repaint everything.
    force_full: bool,
}

impl Renderer<io::Stdout> {
    /// Renderer painting to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for Renderer<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Renderer<W> {
    /// Renderer painting to an arbitrary sink (a byte buffer in tests).
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            last_frame: None,
            last_lines: Vec::new(),
            lines_rendered: 0,
            width: 0,
            height: 0,
            alt_screen: false,
            force_full: true,
        }
    }

    /// Declare the region size. Forces a full repaint on the next render.
    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.force_full = true;
    }

    /// Declare whether output targets the alternate screen buffer.
    ///
    /// Switching screens invalidates the stored frame: what is visible on
    /// the other buffer has no relation to what we painted on this one.
    pub fn set_alt_screen(&mut self, enabled: bool) {
        if self.alt_screen == enabled {
            return;
        }
        self.alt_screen = enabled;
        self.reset();
    }

    /// Erase the screen and forget the stored frame; the next render is a
    /// full repaint.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn clear(&mut self) -> io::Result<()> {
        self.out.write_all(CLEAR_SCREEN)?;
        self.out.write_all(CURSOR_HOME)?;
        self.out.flush()?;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.last_frame = None;
        self.last_lines.clear();
        self.lines_rendered = 0;
        self.force_full = true;
    }

    /// Paint `frame`, emitting only what changed since the previous paint.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn render(&mut self, frame: &str) -> io::Result<()> {
        if !self.force_full && self.last_frame.as_deref() == Some(frame) {
            return Ok(());
        }

        let lines = self.prepare_lines(frame);
        let mut buf = Vec::with_capacity(frame.len() + 64);

        if self.force_full || self.lines_rendered == 0 {
            tracing::trace!(lines = lines.len(), "full repaint");
            self.paint_full(&mut buf, &lines);
        } else {
            self.paint_diff(&mut buf, &lines);
        }

        self.out.write_all(&buf)?;
        self.out.flush()?;

        self.lines_rendered = lines.len();
        self.last_lines = lines;
        self.last_frame = Some(frame.to_owned());
        self.force_full = false;
        Ok(())
    }

    /// Split the frame, keep the last `height` lines, truncate to `width`.
    fn prepare_lines(&self, frame: &str) -> Vec<String> {
        let mut lines: Vec<&str> = frame.split('\n').collect();
        if self.height > 0 && lines.len() > self.height as usize {
            lines.drain(..lines.len() - self.height as usize);
        }
        lines
            .into_iter()
            .map(|line| {
                if self.width > 0 {
                    truncate(line, self.width as usize)
                } else {
                    line.to_owned()
                }
            })
            .collect()
    }

    fn paint_full(&self, buf: &mut Vec<u8>, lines: &[String]) {
        if self.alt_screen {
            buf.extend_from_slice(CURSOR_HOME);
        } else {
            cursor_up(buf, self.lines_rendered.saturating_sub(1));
            buf.push(b'\r');
        }

        for (i, line) in lines.iter().enumerate() {
            buf.extend_from_slice(line.as_bytes());
            buf.extend_from_slice(ERASE_TO_EOL);
            if i < lines.len() - 1 {
                buf.extend_from_slice(b"\r\n");
            }
        }
        self.erase_trailing(buf, lines.len());
        if !self.alt_screen {
            buf.push(b'\r');
        }
    }

    fn paint_diff(&self, buf: &mut Vec<u8>, lines: &[String]) {
        let changed = |i: usize| self.last_lines.get(i) != lines.get(i);

        if self.alt_screen {
            // Absolute positioning: touch only the rows that differ.
            for (i, line) in lines.iter().enumerate() {
                if changed(i) {
                    cursor_row(buf, i + 1);
                    buf.extend_from_slice(line.as_bytes());
                    buf.extend_from_slice(ERASE_TO_EOL);
                }
            }
            self.erase_trailing(buf, lines.len());
        } else {
            // Relative positioning from column 0 of the last painted line.
            cursor_up(buf, self.lines_rendered.saturating_sub(1));
            for (i, line) in lines.iter().enumerate() {
                if changed(i) {
                    buf.push(b'\r');
                    buf.extend_from_slice(line.as_bytes());
                    buf.extend_from_slice(ERASE_TO_EOL);
                }
                if i < lines.len() - 1 {
                    buf.extend_from_slice(b"\r\n");
                }
            }
            self.erase_trailing(buf, lines.len());
            buf.push(b'\r');
        }
    }

    /// Erase rows the previous paint used that the new frame no longer has.
    /// Inline, the cursor walks down through them and back up afterwards.
    fn erase_trailing(&self, buf: &mut Vec<u8>, new_len: usize) {
        if new_len >= self.lines_rendered {
            return;
        }
        let removed = self.lines_rendered - new_len;
        if self.alt_screen {
            for row in new_len..self.lines_rendered {
                cursor_row(buf, row + 1);
                buf.extend_from_slice(ERASE_LINE);
            }
            // Reposition at the end of the content for consistency.
            cursor_row(buf, new_len.max(1));
        } else {
            for _ in 0..removed {
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(ERASE_LINE);
            }
            cursor_up(buf, removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer<Vec<u8>> {
        Renderer::with_writer(Vec::new())
    }

    fn take_output(r: &mut Renderer<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(&mut r.out)).unwrap()
    }

    #[test]
    fn identical_frame_emits_nothing() {
        let mut r = renderer();
        r.render("one\ntwo").unwrap();
        take_output(&mut r);

        r.render("one\ntwo").unwrap();
        assert_eq!(take_output(&mut r), "", "unchanged frame must not write");
    }

    #[test]
    fn first_render_paints_fully_inline() {
        let mut r = renderer();
        r.render("a\nb").unwrap();
        assert_eq!(take_output(&mut r), "\ra\x1b[K\r\nb\x1b[K\r");
    }

    #[test]
    fn inline_diff_rewrites_only_changed_lines() {
        let mut r = renderer();
        r.render("aaa\nbbb\nccc").unwrap();
        take_output(&mut r);

        r.render("aaa\nBBB\nccc").unwrap();
        let out = take_output(&mut r);
        assert_eq!(out, "\x1b[2A\r\n\rBBB\x1b[K\r\n\r");
        assert!(!out.contains("aaa"));
        assert!(!out.contains("ccc"));
    }

    #[test]
    fn alt_screen_diff_addresses_rows_absolutely() {
        let mut r = renderer();
        r.set_alt_screen(true);
        r.render("aaa\nbbb\nccc").unwrap();
        let full = take_output(&mut r);
        assert!(full.starts_with("\x1b[H"));

        r.render("aaa\nbbb\nCCC").unwrap();
        let out = take_output(&mut r);
        assert_eq!(out, "\x1b[3;1HCCC\x1b[K");
    }

    #[test]
    fn shrinking_frame_erases_trailing_lines() {
        let mut r = renderer();
        r.render("a\nb\nc").unwrap();
        take_output(&mut r);

        r.render("a\nb").unwrap();
        let out = take_output(&mut r);
        // Walks down to the removed row, erases it, and comes back up.
        assert_eq!(out, "\x1b[2A\r\n\r\n\x1b[2K\x1b[1A\r");
    }

    #[test]
    fn set_size_forces_full_repaint() {
        let mut r = renderer();
        r.render("same").unwrap();
        take_output(&mut r);

        r.set_size(80, 24);
        r.render("same").unwrap();
        let out = take_output(&mut r);
        assert!(out.contains("same"), "must repaint despite identical content");
    }

    #[test]
    fn width_truncates_by_display_cells() {
        let mut r = renderer();
        r.set_size(3, 0);
        r.render("abcdef").unwrap();
        assert_eq!(take_output(&mut r), "\rabc\x1b[K\r");
    }

    #[test]
    fn height_keeps_the_last_lines() {
        let mut r = renderer();
        r.set_size(0, 2);
        r.render("one\ntwo\nthree").unwrap();
        let out = take_output(&mut r);
        assert!(!out.contains("one"));
        assert!(out.contains("two"));
        assert!(out.contains("three"));
    }

    #[test]
    fn alt_screen_toggle_invalidates_stored_frame() {
        let mut r = renderer();
        r.render("view").unwrap();
        take_output(&mut r);

        r.set_alt_screen(true);
        r.render("view").unwrap();
        let out = take_output(&mut r);
        assert!(out.contains("view"), "stored frame is stale after toggle");
    }

    #[test]
    fn clear_erases_and_forces_repaint() {
        let mut r = renderer();
        r.render("x").unwrap();
        take_output(&mut r);

        r.clear().unwrap();
        let out = take_output(&mut r);
        assert_eq!(out, "\x1b[2J\x1b[H");

        r.render("x").unwrap();
        assert!(take_output(&mut r).contains('x'));
    }

    #[test]
    fn growing_frame_appends_new_rows() {
        let mut r = renderer();
        r.render("a").unwrap();
        take_output(&mut r);

        r.render("a\nb").unwrap();
        let out = take_output(&mut r);
        assert_eq!(out, "\r\n\rb\x1b[K\r");
    }
}
