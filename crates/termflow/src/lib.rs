#![forbid(unsafe_code)]

//! termflow: a terminal-program runtime for render-loop applications.
//!
//! The runtime puts a terminal into a controlled interactive mode, turns raw
//! byte input into structured events (keys, mouse, paste, resize, focus),
//! and paints application frames with minimal terminal writes. It is built
//! for hosts that follow a render-loop model: poll one event, update state,
//! render a new frame.
//!
//! Embedders with a single program can use [`Program`] directly; binding
//! layers that need opaque numeric handles go through [`Registry`].

pub mod program;
pub mod registry;

pub use program::Program;
pub use registry::Registry;

pub use termflow_core::error::{Error, Result};
pub use termflow_core::event::{
    Event, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent,
};
pub use termflow_core::parser::{EventParser, Parsed};
pub use termflow_core::upstream_version;
pub use termflow_core::width::{string_width, truncate};
pub use termflow_render::Renderer;
pub use termflow_tty::{
    InputReader, MouseMode, ReadOutcome, TerminalController, TerminalState, is_tty,
};
