#![forbid(unsafe_code)]

//! Program lifecycle: one terminal controller + one input reader, managed
//! together.
//!
//! A [`Program`] moves through `Created → Initialized → (raw mode / alt
//! screen / reader running) → Released`. Release is where the ordering
//! matters: the reader is stopped (and joined) first, then every terminal
//! mode still active is undone, raw mode last. That ordering is what keeps
//! a user's shell usable after an abnormal exit, and it runs from [`Drop`] too.
//!
//! [`Program::poll_event`] is the composed read path: it drains pending
//! resize notifications, then alternates `read_raw` and the parser while
//! carrying the unconsumed residue between reads, until one event is
//! produced or the deadline passes.

use std::io;
use std::time::{Duration, Instant};

use termflow_core::error::{Error, Result};
use termflow_core::event::Event;
use termflow_core::parser::{EventParser, Parsed};
use termflow_tty::{InputReader, ReadOutcome, TerminalController};

#[cfg(unix)]
use std::sync::mpsc;

/// Default byte capacity handed to `read_raw` by the event poll.
const POLL_READ_CAPACITY: usize = 1024;

/// One terminal program: controller, reader, parser session, and the
/// residue of bytes the parser has not yet consumed.
pub struct Program {
    terminal: Option<TerminalController<io::Stdout>>,
    reader: Option<InputReader>,
    parser: EventParser,
    residue: Vec<u8>,
    #[cfg(unix)]
    resize: Option<ResizeWatcher>,
}

impl Program {
    /// A freshly created program; no terminal resources are touched yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            terminal: None,
            reader: None,
            parser: EventParser::new(),
            residue: Vec::new(),
            #[cfg(unix)]
            resize: None,
        }
    }

    /// Bind the controlling terminal. Idempotent; terminal operations call
    /// this lazily, so an explicit `init` is a warm-up, not a requirement.
    pub fn init(&mut self) {
        let _ = self.terminal();
    }

    /// The terminal controller, created on first use.
    pub fn terminal(&mut self) -> &mut TerminalController<io::Stdout> {
        self.terminal.get_or_insert_with(TerminalController::new)
    }

    /// Replace the input source (a pipe in tests, or a host-supplied fd).
    /// Any running reader is stopped first.
    pub fn attach_reader(&mut self, reader: InputReader) {
        self.stop_reader();
        self.reader = Some(reader);
    }

    /// Start the background input reader and the resize watcher.
    ///
    /// # Errors
    ///
    /// [`Error::TerminalUnavailable`] when no input source can be opened.
    pub fn start_reader(&mut self) -> Result<()> {
        if self.reader.is_none() {
            self.reader = Some(InputReader::new()?);
        }
        let reader = self.reader.as_mut().ok_or(Error::ReaderStopped)?;
        reader.start()?;

        #[cfg(unix)]
        if self.resize.is_none() {
            match ResizeWatcher::new() {
                Ok(watcher) => self.resize = Some(watcher),
                Err(err) => tracing::debug!(?err, "resize watcher unavailable"),
            }
        }
        Ok(())
    }

    /// Stop the reader, joining its thread, and drop the resize watcher.
    pub fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.stop();
        }
        self.reader = None;
        #[cfg(unix)]
        {
            self.resize = None;
        }
    }

    /// Whether the background reader is running.
    #[must_use]
    pub fn reader_running(&self) -> bool {
        self.reader.as_ref().is_some_and(InputReader::is_running)
    }

    /// Raw byte read with bounded wait; see [`InputReader::read_raw`].
    ///
    /// # Errors
    ///
    /// [`Error::ReaderStopped`] when the reader is not running.
    pub fn read_raw(&mut self, timeout: Duration, capacity: usize) -> Result<ReadOutcome> {
        let reader = self.reader.as_mut().ok_or(Error::ReaderStopped)?;
        reader.read_raw(timeout, capacity)
    }

    /// Run a raw chunk through this program's parser session.
    ///
    /// The caller owns the residue: unconsumed bytes must be prepended to
    /// the next chunk. Paste accumulation lives in the session, so chunks
    /// must be presented in order.
    pub fn parse_with_consumed(&mut self, bytes: &[u8]) -> Parsed {
        self.parser.parse(bytes)
    }

    /// Wait up to `timeout` for one structured event.
    ///
    /// Pending resize notifications win over byte input. Returns `Ok(None)`
    /// when the window elapses with no complete event; that is a normal
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// [`Error::ReaderStopped`] when the reader is not running.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        let start = Instant::now();
        loop {
            if let Some(resize) = self.take_resize() {
                return Ok(Some(resize));
            }

            // Drain what the residue already holds.
            let Parsed { event, consumed } = self.parser.parse(&self.residue);
            self.residue.drain(..consumed);
            if let Some(event) = event {
                return Ok(Some(event));
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            match self.read_raw(remaining, POLL_READ_CAPACITY)? {
                ReadOutcome::Data(bytes) => self.residue.extend_from_slice(&bytes),
                ReadOutcome::TimedOut => return Ok(None),
            }
        }
    }

    /// Pop one coalesced resize notification, if any, and turn it into an
    /// event carrying the current size.
    #[cfg(unix)]
    fn take_resize(&mut self) -> Option<Event> {
        let signalled = self
            .resize
            .as_ref()
            .is_some_and(|watcher| watcher.rx.try_recv().is_ok());
        if !signalled {
            return None;
        }
        let (width, height) = self.terminal().size()?;
        Some(Event::Resize { width, height })
    }

    #[cfg(not(unix))]
    fn take_resize(&mut self) -> Option<Event> {
        None
    }

    /// Tear everything down: reader first, then terminal restoration.
    /// Idempotent; also runs from [`Drop`].
    pub fn release(&mut self) {
        self.stop_reader();
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.restore();
        }
        self.terminal = None;
        self.residue.clear();
        tracing::debug!("program released");
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        self.release();
    }
}

/// SIGWINCH watcher: a dedicated signal thread sending coalesced
/// notifications through a capacity-1 channel. The authoritative size is
/// queried when the event is generated, so a storm of signals collapses
/// into one resize event with the final dimensions.
#[cfg(unix)]
struct ResizeWatcher {
    rx: mpsc::Receiver<()>,
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl ResizeWatcher {
    fn new() -> io::Result<Self> {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGWINCH]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let (tx, rx) = mpsc::sync_channel(1);
        let thread = std::thread::Builder::new()
            .name("termflow-resize".into())
            .spawn(move || {
                for _ in signals.forever() {
                    let _ = tx.try_send(());
                }
            })?;
        Ok(Self {
            rx,
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::OwnedFd;
    use termflow_core::event::{KeyCode, KeyEvent, Modifiers};

    fn piped_program() -> (Program, File) {
        let (read_end, write_end): (OwnedFd, OwnedFd) = nix::unistd::pipe().expect("pipe");
        let mut program = Program::new();
        program.attach_reader(InputReader::from_reader(File::from(read_end)));
        program.start_reader().expect("start reader");
        (program, File::from(write_end))
    }

    #[test]
    fn polls_a_simple_key() {
        let (mut program, mut tx) = piped_program();
        tx.write_all(b"q").unwrap();

        let event = program.poll_event(Duration::from_secs(1)).unwrap();
        assert_eq!(
            event,
            Some(Event::Key(KeyEvent::new(KeyCode::Char('q'))))
        );
    }

    #[test]
    fn reassembles_sequences_across_reads() {
        let (mut program, mut tx) = piped_program();

        // The escape introducer and the rest arrive as separate writes; the
        // residue carries the prefix until the sequence completes.
        tx.write_all(b"\x1b").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        tx.write_all(b"[1;5A").unwrap();

        let event = program.poll_event(Duration::from_secs(1)).unwrap();
        assert_eq!(
            event,
            Some(Event::Key(
                KeyEvent::new(KeyCode::Up).with_modifiers(Modifiers::CTRL)
            ))
        );
    }

    #[test]
    fn poll_timeout_is_not_an_error() {
        let (mut program, _tx) = piped_program();
        let event = program.poll_event(Duration::from_millis(30)).unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn poll_without_reader_reports_stopped() {
        let mut program = Program::new();
        assert!(matches!(
            program.poll_event(Duration::ZERO),
            Err(Error::ReaderStopped)
        ));
    }

    #[test]
    fn release_is_idempotent_and_stops_reader() {
        let (mut program, _tx) = piped_program();
        assert!(program.reader_running());

        program.release();
        assert!(!program.reader_running());
        program.release();

        assert!(matches!(
            program.read_raw(Duration::ZERO, 16),
            Err(Error::ReaderStopped)
        ));
    }

    #[test]
    fn multiple_events_drain_one_per_poll() {
        let (mut program, mut tx) = piped_program();
        tx.write_all(b"ab").unwrap();

        let first = program.poll_event(Duration::from_secs(1)).unwrap();
        let second = program.poll_event(Duration::from_secs(1)).unwrap();
        assert_eq!(first, Some(Event::Key(KeyEvent::new(KeyCode::Char('a')))));
        assert_eq!(second, Some(Event::Key(KeyEvent::new(KeyCode::Char('b')))));
    }
}
