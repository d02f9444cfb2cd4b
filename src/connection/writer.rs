//! Writer task draining a connection's outbound queue.

use std::io;

use futures::SinkExt;
use log::{debug, warn};
use tokio::{io::AsyncWrite, sync::mpsc};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};

use super::stream_channel::Outbound;
use crate::{
    channel::WriteError,
    frame::{FrameCodec, FramingError},
};

/// Write queued frames in order, reporting each outcome to its notifier.
///
/// Runs until every sender is dropped or `closed` fires. A frame the codec
/// refuses, such as one over the payload limit, fails only its own
/// notifier. A transport failure closes the connection and is returned.
/// Frames still queued when the task stops fail with
/// [`WriteError::Closed`].
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(super) async fn run_writer<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let mut fault = None;
    loop {
        let next = tokio::select! {
            biased;

            () = closed.cancelled() => None,
            next = rx.recv() => next,
        };
        let Some(Outbound { frame, notifier }) = next else {
            break;
        };
        match sink.send(frame).await {
            Ok(()) => notifier.complete(Ok(())),
            Err(FramingError::Io(source)) => {
                warn!("write failed, closing connection: error={source}");
                notifier.complete(Err(WriteError::Io(io::Error::new(
                    source.kind(),
                    source.to_string(),
                ))));
                closed.cancel();
                fault = Some(FramingError::Io(source));
                break;
            }
            Err(refused) => {
                warn!("reply not written: error={refused}");
                notifier.complete(Err(WriteError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    refused,
                ))));
            }
        }
    }

    rx.close();
    let mut abandoned = 0_usize;
    while let Ok(Outbound { notifier, .. }) = rx.try_recv() {
        notifier.complete(Err(WriteError::Closed));
        abandoned += 1;
    }
    if abandoned > 0 {
        debug!("abandoned queued writes: count={abandoned}");
    }
    if let Err(err) = sink.close().await {
        debug!("failed to shut down write half: error={err}");
    }
    fault.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::{channel::WriteCompletion, frame::HEADER_LEN};

    #[tokio::test]
    async fn writes_frames_in_queue_order() {
        let (client, mut server) = tokio::io::duplex(256);
        let (tx, rx) = mpsc::channel(4);
        let closed = CancellationToken::new();
        let task = tokio::spawn(run_writer(
            FramedWrite::new(client, FrameCodec::default()),
            rx,
            closed,
        ));

        let mut completions = Vec::new();
        for frame in [&b"first"[..], &b"second"[..]] {
            let (completion, notifier) = WriteCompletion::pending();
            tx.send(Outbound {
                frame: Bytes::copy_from_slice(frame),
                notifier,
            })
            .await
            .expect("queued");
            completions.push(completion);
        }
        drop(tx);
        for completion in completions {
            assert!(completion.wait().await.is_ok());
        }
        task.await.expect("writer exits").expect("no fault");

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.expect("read");
        assert_eq!(written, b"firstsecond");
    }

    #[tokio::test]
    async fn cancelled_writer_fails_queued_frames() {
        let (client, _server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(4);
        let closed = CancellationToken::new();
        closed.cancel();
        let (completion, notifier) = WriteCompletion::pending();
        tx.send(Outbound {
            frame: Bytes::from_static(b"never"),
            notifier,
        })
        .await
        .expect("queued");
        let outcome =
            run_writer(FramedWrite::new(client, FrameCodec::default()), rx, closed).await;
        assert!(outcome.is_ok());
        assert!(matches!(completion.wait().await, Err(WriteError::Closed)));
    }

    #[tokio::test]
    async fn refused_frame_fails_only_its_own_write() {
        let (client, mut server) = tokio::io::duplex(256);
        let (tx, rx) = mpsc::channel(4);
        let closed = CancellationToken::new();
        let task = tokio::spawn(run_writer(
            FramedWrite::new(client, FrameCodec::new(4)),
            rx,
            closed.clone(),
        ));

        let mut oversized = vec![0_u8; HEADER_LEN];
        oversized.extend_from_slice(b"too long");
        let mut small = vec![1_u8; HEADER_LEN];
        small.extend_from_slice(b"ok");
        let mut completions = Vec::new();
        for frame in [oversized, small.clone()] {
            let (completion, notifier) = WriteCompletion::pending();
            tx.send(Outbound {
                frame: Bytes::from(frame),
                notifier,
            })
            .await
            .expect("queued");
            completions.push(completion);
        }
        drop(tx);

        let mut completions = completions.into_iter();
        let refused = completions.next().expect("first").wait().await;
        assert!(
            matches!(
                &refused,
                Err(WriteError::Io(err)) if err.kind() == io::ErrorKind::InvalidData
            ),
            "{refused:?}"
        );
        assert!(completions.next().expect("second").wait().await.is_ok());
        task.await.expect("writer exits").expect("no fault");
        assert!(!closed.is_cancelled(), "refused frame keeps the connection");

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.expect("read");
        assert_eq!(written, small);
    }

    #[tokio::test]
    async fn transport_failure_is_returned() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let (tx, rx) = mpsc::channel(4);
        let closed = CancellationToken::new();
        let (completion, notifier) = WriteCompletion::pending();
        tx.send(Outbound {
            frame: Bytes::from_static(b"lost"),
            notifier,
        })
        .await
        .expect("queued");
        drop(tx);

        let sink = FramedWrite::new(client, FrameCodec::default());
        let outcome = run_writer(sink, rx, closed.clone()).await;
        assert!(matches!(outcome, Err(FramingError::Io(_))), "{outcome:?}");
        assert!(matches!(completion.wait().await, Err(WriteError::Io(_))));
        assert!(closed.is_cancelled());
    }
}
