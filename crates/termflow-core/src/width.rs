#![forbid(unsafe_code)]

//! Display-width accounting for frame text.
//!
//! Line-wrap and diff alignment decisions depend on terminal *cells*, not
//! characters or bytes: combining marks occupy zero cells, East-Asian wide
//! characters occupy two, and ANSI escape sequences occupy none at all.
//! [`string_width`] and [`truncate`] both scan with a small state machine
//! that passes CSI and OSC sequences through at zero width.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Ground,
    Escape,
    Csi,
    Osc,
    /// ESC seen inside an OSC body (possible ST terminator).
    OscEscape,
}

/// Advance the escape-sequence scanner by one character.
///
/// Returns the next state and whether `c` is visible text (as opposed to a
/// byte belonging to an escape sequence).
fn scan(state: ScanState, c: char) -> (ScanState, bool) {
    match state {
        ScanState::Ground => match c {
            '\x1b' => (ScanState::Escape, false),
            _ => (ScanState::Ground, true),
        },
        ScanState::Escape => match c {
            '[' => (ScanState::Csi, false),
            ']' => (ScanState::Osc, false),
            // Two-character sequences such as ESC 7 / ESC 8.
            _ => (ScanState::Ground, false),
        },
        ScanState::Csi => match c {
            // Final byte range of a CSI sequence.
            '\u{40}'..='\u{7e}' => (ScanState::Ground, false),
            _ => (ScanState::Csi, false),
        },
        ScanState::Osc => match c {
            '\x07' => (ScanState::Ground, false),
            '\x1b' => (ScanState::OscEscape, false),
            _ => (ScanState::Osc, false),
        },
        ScanState::OscEscape => match c {
            '\\' => (ScanState::Ground, false),
            _ => (ScanState::Osc, false),
        },
    }
}

/// Display width of `s` in terminal cells.
///
/// Zero for combining and other zero-width characters, one for normal
/// characters, two for wide (e.g. East-Asian fullwidth) characters. CSI and
/// OSC escape sequences contribute nothing.
#[must_use]
pub fn string_width(s: &str) -> usize {
    let mut state = ScanState::Ground;
    let mut width = 0;
    for c in s.chars() {
        let (next, visible) = scan(state, c);
        state = next;
        if visible {
            width += c.width().unwrap_or(0);
        }
    }
    width
}

/// Truncate `s` to at most `max_width` display cells.
///
/// Truncation happens on grapheme-cluster boundaries so a combining mark is
/// never separated from its base. Escape sequences are copied through even
/// past the cut point, so any styling reset that follows dropped text still
/// reaches the terminal.
#[must_use]
pub fn truncate(s: &str, max_width: usize) -> String {
    if string_width(s) <= max_width {
        return s.to_owned();
    }

    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::Ground;
    let mut used = 0;
    let mut cut = false;

    for grapheme in s.graphemes(true) {
        // A grapheme either starts an escape sequence or is visible text;
        // terminals never interleave the two inside a cluster.
        if state != ScanState::Ground || grapheme.starts_with('\x1b') {
            for c in grapheme.chars() {
                let (next, _) = scan(state, c);
                state = next;
            }
            out.push_str(grapheme);
            continue;
        }

        if cut {
            continue;
        }
        let w: usize = grapheme.chars().map(|c| c.width().unwrap_or(0)).sum();
        if used + w > max_width {
            cut = true;
            continue;
        }
        used += w;
        out.push_str(grapheme);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_width_equals_char_count() {
        assert_eq!(string_width("hello"), 5);
        assert_eq!(string_width(""), 0);
    }

    #[test]
    fn wide_and_combining_characters() {
        // One double-width character followed by one combining mark: 2 cells.
        assert_eq!(string_width("語\u{0301}"), 2);
        assert_eq!(string_width("日本語"), 6);
        // Combining acute on 'e'.
        assert_eq!(string_width("e\u{0301}"), 1);
    }

    #[test]
    fn escape_sequences_are_invisible() {
        assert_eq!(string_width("\x1b[31mred\x1b[0m"), 3);
        assert_eq!(string_width("\x1b]2;title\x07ok"), 2);
        assert_eq!(string_width("\x1b]2;title\x1b\\ok"), 2);
    }

    #[test]
    fn truncate_counts_cells_not_chars() {
        assert_eq!(truncate("hello", 3), "hel");
        // A wide char that does not fit is dropped entirely.
        assert_eq!(truncate("a日b", 2), "a");
        assert_eq!(truncate("a日b", 3), "a日");
    }

    #[test]
    fn truncate_keeps_combining_marks_with_base() {
        assert_eq!(truncate("e\u{0301}x", 1), "e\u{0301}");
    }

    #[test]
    fn truncate_preserves_escape_sequences_past_cut() {
        let styled = "\x1b[1mboldtext\x1b[0m";
        let cut = truncate(styled, 4);
        assert_eq!(cut, "\x1b[1mbold\x1b[0m");
    }

    #[test]
    fn truncate_is_identity_when_it_fits() {
        assert_eq!(truncate("fits", 10), "fits");
        assert_eq!(truncate("exact", 5), "exact");
    }
}
