#![forbid(unsafe_code)]

//! Error taxonomy shared by every termflow crate.
//!
//! The set is deliberately small. A poll that finds no input is *not* an
//! error (see `ReadOutcome` in `termflow-tty`), and a malformed escape
//! sequence is surfaced as [`crate::event::Event::Unknown`] so the read loop
//! keeps making progress. What remains are conditions with externally
//! observable preconditions: no terminal attached, a dead handle, a reader
//! that is not running, and plain I/O failures.

use thiserror::Error;

/// Errors surfaced across the termflow boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// The process is not attached to a real terminal. Affects raw-mode
    /// entry and size queries only; best-effort toggles never report this.
    #[error("not attached to a terminal")]
    TerminalUnavailable,

    /// An operation was attempted on a freed or never-initialized handle.
    #[error("handle {0} does not refer to a live resource")]
    ResourceReleased(u64),

    /// `read_raw` was called on a reader that is not running.
    #[error("input reader is not running")]
    ReaderStopped,

    /// An underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
