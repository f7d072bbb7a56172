//! Property-based tests for the parser's split-invariance contract.
//!
//! For any byte sequence B and any partition of B into chunks, feeding the
//! chunks through a parser (with residue management mirroring what the
//! runtime does) must yield exactly the events produced by parsing B in one
//! call. This is the property that makes escape sequences safe to split
//! across independent reads.

use proptest::prelude::*;
use termflow_core::event::Event;
use termflow_core::parser::{EventParser, Parsed};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Drain a buffer through the parser, collecting events and the residue.
fn drain(parser: &mut EventParser, residue: &mut Vec<u8>, events: &mut Vec<Event>) {
    loop {
        let Parsed { event, consumed } = parser.parse(residue);
        residue.drain(..consumed);
        match event {
            Some(ev) => events.push(ev),
            None => break,
        }
    }
}

/// Parse `bytes` delivered as the given chunks, with residue carried across
/// chunk boundaries the way the runtime carries it across reads.
fn parse_chunked(chunks: &[&[u8]]) -> (Vec<Event>, Vec<u8>) {
    let mut parser = EventParser::new();
    let mut residue = Vec::new();
    let mut events = Vec::new();
    for chunk in chunks {
        residue.extend_from_slice(chunk);
        drain(&mut parser, &mut residue, &mut events);
    }
    (events, residue)
}

/// Byte soups biased toward escape-sequence structure so the interesting
/// parser paths are actually exercised.
fn input_strategy() -> impl Strategy<Value = Vec<u8>> {
    let fragment = prop_oneof![
        // Printable ASCII runs.
        proptest::collection::vec(0x20u8..0x7f, 1..6),
        // Control bytes.
        proptest::collection::vec(0x00u8..0x20, 1..3),
        // Well-formed special sequences.
        Just(b"\x1b[A".to_vec()),
        Just(b"\x1b[1;5C".to_vec()),
        Just(b"\x1b[15~".to_vec()),
        Just(b"\x1bOQ".to_vec()),
        Just(b"\x1b[Z".to_vec()),
        Just(b"\x1b[I".to_vec()),
        Just(b"\x1b[<0;3;4M".to_vec()),
        Just(b"\x1b[<65;9;9M".to_vec()),
        Just(vec![0x1b, b'[', b'M', 32, 40, 41]),
        Just(b"\x1b[200~paste me\x1b[201~".to_vec()),
        Just("héllo語".as_bytes().to_vec()),
        // Unrecognized and malformed material.
        Just(b"\x1b[99~".to_vec()),
        Just(b"\x1b]0;t\x07".to_vec()),
        Just(vec![0xff, 0xc3]),
        proptest::collection::vec(any::<u8>(), 1..5),
    ];
    proptest::collection::vec(fragment, 0..12).prop_map(|frags| frags.concat())
}

// ═════════════════════════════════════════════════════════════════════════
// Split-invariance: any bisection equals one-shot parsing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn bisection_preserves_events(bytes in input_strategy(), split in any::<prop::sample::Index>()) {
        let whole = parse_chunked(&[&bytes[..]]);

        let at = if bytes.is_empty() { 0 } else { split.index(bytes.len()) };
        let halves = parse_chunked(&[&bytes[..at], &bytes[at..]]);

        prop_assert_eq!(&halves.0, &whole.0, "events diverge for split at {}", at);
        prop_assert_eq!(&halves.1, &whole.1, "residue diverges for split at {}", at);
    }

    #[test]
    fn byte_at_a_time_preserves_events(bytes in input_strategy()) {
        let whole = parse_chunked(&[&bytes[..]]);

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let dribbled = parse_chunked(&singles);

        prop_assert_eq!(&dribbled.0, &whole.0);
        prop_assert_eq!(&dribbled.1, &whole.1);
    }

    #[test]
    fn drained_residue_is_inert(bytes in input_strategy()) {
        // Once draining stops, the leftover bytes are a prefix of an
        // incomplete sequence: re-parsing them without new input must
        // consume nothing and produce nothing (no busy progress).
        let mut parser = EventParser::new();
        let mut residue = bytes.clone();
        let mut events = Vec::new();
        drain(&mut parser, &mut residue, &mut events);

        let again = parser.parse(&residue);
        prop_assert_eq!(again.event, None);
        prop_assert_eq!(again.consumed, 0);
    }
}
