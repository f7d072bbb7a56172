#![forbid(unsafe_code)]

//! Background input reader.
//!
//! [`InputReader::start`] spawns one thread that polls the input fd, reads
//! whatever bytes are available (up to one burst), and hands owned chunks to
//! the consumer through a bounded channel. The channel is the only structure
//! shared between the two execution contexts:
//!
//! - the producer blocks when the channel is full (backpressure, no drops);
//! - the consumer blocks with a timeout when it is empty (no busy spin);
//! - chunks arrive in exactly the order the OS delivered the bytes.
//!
//! [`InputReader::stop`] is safe to call while a read is in flight: the loop
//! never blocks longer than one poll interval, a producer stuck on a full
//! channel fails fast once the consumer end drops, and `stop` joins the
//! thread before returning so teardown afterwards is race-free.

use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use termflow_core::error::{Error, Result};

/// Bytes read from the fd per loop iteration: one terminal write burst.
const READ_BURST: usize = 256;

/// Bounded channel capacity, in chunks.
const CHUNK_QUEUE: usize = 64;

/// How long the loop waits in `poll(2)` before re-checking shutdown.
const POLL_INTERVAL_MS: u16 = 100;

/// Outcome of a [`InputReader::read_raw`] call. A timeout is a normal poll
/// result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// At least one byte arrived; everything buffered (up to the caller's
    /// capacity) is returned.
    Data(Vec<u8>),
    /// Nothing arrived within the requested window.
    TimedOut,
}

/// Background read loop over the terminal's input stream.
///
/// Exactly one consumer is supported: `read_raw` takes `&mut self` and the
/// partially-consumed chunk tail lives on the consumer side.
#[derive(Debug)]
pub struct InputReader {
    /// Input source; moved into the thread when started.
    source: Option<File>,
    /// Consumer end of the chunk queue while the loop runs.
    rx: Option<mpsc::Receiver<Vec<u8>>>,
    /// Tail of a chunk the previous `read_raw` did not fully hand out.
    pending: Vec<u8>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl InputReader {
    /// Reader over the process's controlling terminal.
    ///
    /// # Errors
    ///
    /// [`Error::TerminalUnavailable`] when `/dev/tty` cannot be opened.
    #[cfg(unix)]
    pub fn new() -> Result<Self> {
        let tty = File::open("/dev/tty").map_err(|_| Error::TerminalUnavailable)?;
        Ok(Self::from_reader(tty))
    }

    #[cfg(not(unix))]
    pub fn new() -> Result<Self> {
        Err(Error::TerminalUnavailable)
    }

    /// Reader over an arbitrary file descriptor (a pipe in tests).
    #[must_use]
    pub fn from_reader(source: File) -> Self {
        Self {
            source: Some(source),
            rx: None,
            pending: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Whether the background loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the background read loop. Starting a running reader is a no-op;
    /// a stopped reader cannot be restarted (its fd was released).
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let source = self.source.take().ok_or(Error::ReaderStopped)?;

        let (tx, rx) = mpsc::sync_channel(CHUNK_QUEUE);
        let shutdown = Arc::clone(&self.shutdown);
        shutdown.store(false, Ordering::Release);

        let handle = thread::Builder::new()
            .name("termflow-input".into())
            .spawn(move || read_loop(source, &tx, &shutdown))
            .map_err(Error::Io)?;

        self.rx = Some(rx);
        self.handle = Some(handle);
        tracing::debug!("input reader started");
        Ok(())
    }

    /// Signal the loop to terminate and block until it has exited.
    ///
    /// Dropping the consumer end first means a producer blocked on a full
    /// channel errors out of `send` immediately instead of waiting for a
    /// drain that will never come.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::debug!("input reader stopped");
        }
        self.pending.clear();
    }

    /// Wait up to `timeout` for input, then return whatever is buffered.
    ///
    /// Returns at most `capacity` bytes; a longer buffered run is kept for
    /// the next call, preserving byte order. A zero timeout is a
    /// non-blocking poll. Once the first byte is available the call returns
    /// without further blocking.
    ///
    /// # Errors
    ///
    /// [`Error::ReaderStopped`] when the reader is not running (never
    /// started, stopped, or its fd reached EOF and the queue has drained).
    pub fn read_raw(&mut self, timeout: Duration, capacity: usize) -> Result<ReadOutcome> {
        let rx = self.rx.as_ref().ok_or(Error::ReaderStopped)?;
        if capacity == 0 {
            return Ok(ReadOutcome::TimedOut);
        }

        if self.pending.is_empty() {
            let first = if timeout.is_zero() {
                match rx.try_recv() {
                    Ok(chunk) => chunk,
                    Err(TryRecvError::Empty) => return Ok(ReadOutcome::TimedOut),
                    Err(TryRecvError::Disconnected) => return Err(Error::ReaderStopped),
                }
            } else {
                match rx.recv_timeout(timeout) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => return Ok(ReadOutcome::TimedOut),
                    Err(RecvTimeoutError::Disconnected) => return Err(Error::ReaderStopped),
                }
            };
            self.pending = first;
        }

        // First byte is in hand; drain the rest of the queue opportunistically.
        while self.pending.len() < capacity {
            match rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }

        let take = self.pending.len().min(capacity);
        let data = self.pending.drain(..take).collect();
        Ok(ReadOutcome::Data(data))
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The background loop: poll, read one burst, send, repeat.
fn read_loop(mut source: File, tx: &mpsc::SyncSender<Vec<u8>>, shutdown: &AtomicBool) {
    let mut buf = [0u8; READ_BURST];
    loop {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        match wait_readable(&source) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                tracing::debug!(?err, "input poll failed, reader exiting");
                return;
            }
        }
        match source.read(&mut buf) {
            // EOF: the other end closed; nothing more will arrive.
            Ok(0) => return,
            Ok(n) => {
                // Blocks when the queue is full (backpressure); errors when
                // the consumer dropped the receiver (stop in progress).
                if tx.send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => {
                tracing::debug!(?err, "input read failed, reader exiting");
                return;
            }
        }
    }
}

/// Bounded wait for the fd to become readable.
#[cfg(unix)]
fn wait_readable(source: &File) -> std::io::Result<bool> {
    use std::os::fd::AsFd;

    let mut fds = [nix::poll::PollFd::new(
        source.as_fd(),
        nix::poll::PollFlags::POLLIN,
    )];
    match nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(POLL_INTERVAL_MS)) {
        Ok(n) => Ok(n > 0),
        Err(nix::errno::Errno::EINTR) => Ok(false),
        Err(errno) => Err(std::io::Error::other(errno)),
    }
}

/// Non-Unix fallback: pretend the fd is always readable and rely on the
/// blocking read. Shutdown latency matches the next arriving byte.
#[cfg(not(unix))]
fn wait_readable(_source: &File) -> std::io::Result<bool> {
    Ok(true)
}
