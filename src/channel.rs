//! Connection abstraction consumed by the dispatcher.
//!
//! Writes never block: [`Channel::write`] returns a [`WriteCompletion`]
//! that fires once the transport has flushed (or failed to flush) the bytes.

use std::{io, net::SocketAddr};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors reported through a [`WriteCompletion`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// The connection closed before the bytes were written.
    #[error("channel closed before the write completed")]
    Closed,
    /// The outbound queue was full.
    #[error("outbound queue full")]
    Backlogged,
    /// The transport failed while writing.
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// A connection to a single peer.
pub trait Channel: Send + Sync {
    /// Whether the connection can still accept writes.
    fn is_open(&self) -> bool;

    /// Queue an already-framed message for writing.
    fn write(&self, frame: Bytes) -> WriteCompletion;

    /// Address of the remote peer, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Local address of the connection, if known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Close the connection. Further writes fail with [`WriteError::Closed`].
    fn close(&self);
}

/// Remote IP as a string, or an empty string when unknown.
#[must_use]
pub fn peer_ip(channel: &dyn Channel) -> String {
    channel
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

/// Remote host recorded on requests.
///
/// Uses the textual IP; reverse lookups would block the calling task.
#[must_use]
pub fn peer_host(channel: &dyn Channel) -> String { peer_ip(channel) }

type WriteResult = Result<(), WriteError>;

enum CompletionState {
    Ready(WriteResult),
    Pending(oneshot::Receiver<WriteResult>),
}

/// Promise resolved when a write finishes.
///
/// Use [`WriteCompletion::on_complete`] to attach a callback, or await it
/// via [`WriteCompletion::wait`].
#[must_use = "a write completion must be observed or the outcome is lost"]
pub struct WriteCompletion {
    state: CompletionState,
}

impl WriteCompletion {
    /// A completion that has already resolved.
    pub fn ready(result: WriteResult) -> Self {
        Self {
            state: CompletionState::Ready(result),
        }
    }

    /// A completion resolved later through the returned [`WriteNotifier`].
    ///
    /// Dropping the notifier resolves the completion with
    /// [`WriteError::Closed`].
    pub fn pending() -> (Self, WriteNotifier) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                state: CompletionState::Pending(rx),
            },
            WriteNotifier(tx),
        )
    }

    /// Whether the outcome is already known.
    #[must_use]
    pub fn is_ready(&self) -> bool { matches!(self.state, CompletionState::Ready(_)) }

    /// Wait for the write outcome.
    pub async fn wait(self) -> WriteResult {
        match self.state {
            CompletionState::Ready(result) => result,
            CompletionState::Pending(rx) => rx.await.unwrap_or(Err(WriteError::Closed)),
        }
    }

    /// Run `callback` exactly once with the write outcome.
    ///
    /// A ready completion invokes `callback` synchronously on the caller;
    /// a pending one spawns a task on the current Tokio runtime that invokes
    /// it when the transport reports back.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(WriteResult) + Send + 'static,
    {
        match self.state {
            CompletionState::Ready(result) => callback(result),
            CompletionState::Pending(rx) => {
                tokio::spawn(async move {
                    let result = rx.await.unwrap_or(Err(WriteError::Closed));
                    callback(result);
                });
            }
        }
    }
}

/// Transport-side half of a pending [`WriteCompletion`].
#[derive(Debug)]
pub struct WriteNotifier(oneshot::Sender<WriteResult>);

impl WriteNotifier {
    /// Resolve the paired completion.
    pub fn complete(self, result: WriteResult) {
        // The dispatcher may have stopped listening; nothing else to notify.
        let _ = self.0.send(result);
    }
}
