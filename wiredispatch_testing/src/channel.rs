//! In-memory [`Channel`] recording every write.

use std::{
    net::SocketAddr,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use wiredispatch::{
    channel::{Channel, WriteCompletion, WriteError, WriteNotifier},
    message::Response,
};

use crate::frames::decode_reply;

/// How [`RecordingChannel`] completes writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionMode {
    /// Every write succeeds immediately.
    #[default]
    Immediate,
    /// Every write fails immediately with an I/O error.
    Fail,
    /// Writes stay pending until the test resolves them.
    Deferred,
}

/// Channel double recording written frames.
#[derive(Debug)]
pub struct RecordingChannel {
    open: AtomicBool,
    mode: Mutex<CompletionMode>,
    writes: Mutex<Vec<Bytes>>,
    pending: Mutex<Vec<WriteNotifier>>,
    closes: AtomicUsize,
    remote: Option<SocketAddr>,
    local: Option<SocketAddr>,
}

impl Default for RecordingChannel {
    fn default() -> Self { Self::new() }
}

impl RecordingChannel {
    /// Open channel between `10.0.0.5:40000` and `127.0.0.1:7878`.
    ///
    /// # Panics
    ///
    /// Never; the fixed addresses always parse.
    #[must_use]
    pub fn new() -> Self {
        Self::with_addrs(
            Some("10.0.0.5:40000".parse().expect("remote addr")),
            Some("127.0.0.1:7878".parse().expect("local addr")),
        )
    }

    /// Open channel with the given endpoints.
    #[must_use]
    pub fn with_addrs(remote: Option<SocketAddr>, local: Option<SocketAddr>) -> Self {
        Self {
            open: AtomicBool::new(true),
            mode: Mutex::new(CompletionMode::Immediate),
            writes: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            remote,
            local,
        }
    }

    #[must_use]
    pub fn with_mode(self, mode: CompletionMode) -> Self {
        self.set_mode(mode);
        self
    }

    /// Change how subsequent writes complete.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_mode(&self, mode: CompletionMode) { *self.mode.lock().expect("mode lock") = mode; }

    /// Mark the channel closed without counting a [`Channel::close`] call,
    /// as if the peer went away.
    pub fn disconnect(&self) { self.open.store(false, Ordering::SeqCst); }

    /// Frames written so far, in write order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn writes(&self) -> Vec<Bytes> { self.writes.lock().expect("writes lock").clone() }

    /// Written frames decoded as responses.
    #[must_use]
    pub fn replies(&self) -> Vec<Response> { self.writes().iter().map(decode_reply).collect() }

    /// Number of [`Channel::close`] calls.
    #[must_use]
    pub fn close_calls(&self) -> usize { self.closes.load(Ordering::SeqCst) }

    /// Writes awaiting resolution in [`CompletionMode::Deferred`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn pending_writes(&self) -> usize { self.pending.lock().expect("pending lock").len() }

    /// Resolve every deferred write successfully.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn complete_pending(&self) {
        for notifier in self.pending.lock().expect("pending lock").drain(..) {
            notifier.complete(Ok(()));
        }
    }

    /// Fail every deferred write with [`WriteError::Closed`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_pending(&self) {
        for notifier in self.pending.lock().expect("pending lock").drain(..) {
            notifier.complete(Err(WriteError::Closed));
        }
    }
}

impl Channel for RecordingChannel {
    fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    fn write(&self, frame: Bytes) -> WriteCompletion {
        self.writes.lock().expect("writes lock").push(frame);
        match *self.mode.lock().expect("mode lock") {
            CompletionMode::Immediate => WriteCompletion::ready(Ok(())),
            CompletionMode::Fail => WriteCompletion::ready(Err(WriteError::Io(
                std::io::Error::other("connection reset"),
            ))),
            CompletionMode::Deferred => {
                let (completion, notifier) = WriteCompletion::pending();
                self.pending.lock().expect("pending lock").push(notifier);
                completion
            }
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> { self.remote }

    fn local_addr(&self) -> Option<SocketAddr> { self.local }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}
