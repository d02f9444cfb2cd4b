//! [`Channel`] implementation backed by a connection's writer task.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, WriteCompletion, WriteError, WriteNotifier};

/// A framed reply queued for the writer task.
#[derive(Debug)]
pub(super) struct Outbound {
    pub(super) frame: Bytes,
    pub(super) notifier: WriteNotifier,
}

/// Handle given to the dispatcher for one stream connection.
///
/// Writes are queued on a bounded channel; a full queue fails the write
/// with [`WriteError::Backlogged`] instead of waiting.
#[derive(Debug)]
pub struct StreamChannel {
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    remote: Option<SocketAddr>,
    local: Option<SocketAddr>,
}

impl StreamChannel {
    pub(super) fn new(
        tx: mpsc::Sender<Outbound>,
        closed: CancellationToken,
        remote: Option<SocketAddr>,
        local: Option<SocketAddr>,
    ) -> Self {
        Self {
            tx,
            closed,
            remote,
            local,
        }
    }
}

impl Channel for StreamChannel {
    fn is_open(&self) -> bool { !self.closed.is_cancelled() && !self.tx.is_closed() }

    fn write(&self, frame: Bytes) -> WriteCompletion {
        if !self.is_open() {
            return WriteCompletion::ready(Err(WriteError::Closed));
        }
        let (completion, notifier) = WriteCompletion::pending();
        match self.tx.try_send(Outbound { frame, notifier }) {
            Ok(()) => completion,
            Err(TrySendError::Full(_)) => WriteCompletion::ready(Err(WriteError::Backlogged)),
            Err(TrySendError::Closed(_)) => WriteCompletion::ready(Err(WriteError::Closed)),
        }
    }

    fn remote_addr(&self) -> Option<SocketAddr> { self.remote }

    fn local_addr(&self) -> Option<SocketAddr> { self.local }

    fn close(&self) { self.closed.cancel(); }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn channel(capacity: usize) -> (StreamChannel, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            StreamChannel::new(tx, CancellationToken::new(), None, None),
            rx,
        )
    }

    #[rstest]
    #[tokio::test]
    async fn queued_write_completes_through_notifier() {
        let (channel, mut rx) = channel(1);
        let completion = channel.write(Bytes::from_static(b"frame"));
        assert!(!completion.is_ready());
        let outbound = rx.recv().await.expect("queued");
        assert_eq!(&outbound.frame[..], b"frame");
        outbound.notifier.complete(Ok(()));
        assert!(completion.wait().await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn full_queue_reports_backlog() {
        let (channel, _rx) = channel(1);
        let _first = channel.write(Bytes::from_static(b"a"));
        let second = channel.write(Bytes::from_static(b"b"));
        assert!(matches!(second.wait().await, Err(WriteError::Backlogged)));
    }

    #[rstest]
    #[tokio::test]
    async fn closed_channel_rejects_writes() {
        let (channel, _rx) = channel(1);
        channel.close();
        assert!(!channel.is_open());
        let completion = channel.write(Bytes::from_static(b"late"));
        assert!(completion.is_ready());
        assert!(matches!(completion.wait().await, Err(WriteError::Closed)));
    }
}
