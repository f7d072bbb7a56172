#![forbid(unsafe_code)]

//! Core: canonical events, escape-sequence parsing, and width accounting.

pub mod error;
pub mod event;
pub mod parser;
pub mod width;

pub use error::{Error, Result};
pub use event::Event;
pub use parser::{EventParser, Parsed};

/// Version string of this core, exposed at the binding boundary so hosts
/// can report which engine they are wrapping.
#[must_use]
pub fn upstream_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
