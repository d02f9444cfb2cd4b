//! Stream transport driving the dispatcher for one connection.
//!
//! The read side decodes [`WireFrame`](crate::frame::WireFrame)s and hands
//! them to the [`Dispatcher`]. Replies travel through a bounded queue to a
//! dedicated writer task so that workers never wait on socket I/O.

mod counter;
mod stream_channel;
mod writer;

use std::{net::SocketAddr, sync::Arc};

pub use counter::open_connections;
use counter::ConnectionGuard;
use futures::StreamExt;
use log::{error, info, warn};
use serde::Deserialize;
pub use stream_channel::StreamChannel;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    channel::Channel,
    dispatch::Dispatcher,
    error::DispatchError,
    frame::{DEFAULT_MAX_PAYLOAD_LEN, FrameCodec},
    metrics,
};

/// Default number of replies that may wait for the writer task.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 1024;

/// Per-connection limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Largest payload accepted from, or written to, the peer.
    pub max_payload_len: usize,
    /// Replies that may be queued for writing before writes fail with
    /// [`WriteError::Backlogged`](crate::channel::WriteError::Backlogged).
    pub write_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
        }
    }
}

/// Addresses of the two ends of a connection, when known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub peer: Option<SocketAddr>,
    pub local: Option<SocketAddr>,
}

/// Serve one connection until the peer disconnects, a fatal error occurs,
/// or `shutdown` fires.
///
/// After the peer closes its side, replies still being produced for
/// earlier requests are written before the connection is torn down.
///
/// # Errors
///
/// Returns the [`DispatchError`] that closed the connection:
/// [`DispatchError::ChannelFault`] for framing errors or a failed reply
/// write, and [`DispatchError::UnsupportedMessageType`] for undecodable
/// message types.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn serve_connection<S>(
    stream: S,
    endpoints: Endpoints,
    dispatcher: Dispatcher,
    config: ConnectionConfig,
    shutdown: CancellationToken,
) -> Result<(), DispatchError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let _guard = ConnectionGuard::acquire();
    let Endpoints { peer, .. } = endpoints;
    info!(
        "connection opened: peer={peer:?}, open_connections={}",
        open_connections()
    );

    let codec = FrameCodec::new(config.max_payload_len);
    let (read_half, write_half) = tokio::io::split(stream);
    let closed = shutdown.child_token();
    let (tx, rx) = mpsc::channel(config.write_queue_capacity.max(1));
    let writer = tokio::spawn(writer::run_writer(
        FramedWrite::new(write_half, codec),
        rx,
        closed.clone(),
    ));
    let channel: Arc<dyn Channel> = Arc::new(StreamChannel::new(
        tx,
        closed.clone(),
        endpoints.peer,
        endpoints.local,
    ));
    let mut frames = FramedRead::new(read_half, codec);

    let mut result = loop {
        let next = tokio::select! {
            biased;

            () = closed.cancelled() => None,
            next = frames.next() => Some(next),
        };
        let Some(next) = next else { break Ok(()) };
        match next {
            None => break Ok(()),
            Some(Ok(frame)) => {
                if let Err(err) = dispatcher.dispatch(Arc::clone(&channel), frame).await
                    && err.closes_connection()
                {
                    channel.close();
                    break Err(err);
                }
            }
            Some(Err(source)) => {
                let err = DispatchError::from(source);
                metrics::inc_errors(err.label());
                error!("{err}: peer={peer:?}");
                channel.close();
                break Err(err);
            }
        }
    };

    drop(frames);
    drop(channel);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(fault)) => {
            let err = DispatchError::from(fault);
            metrics::inc_errors(err.label());
            error!("{err}: peer={peer:?}");
            if result.is_ok() {
                result = Err(err);
            }
        }
        Err(err) => warn!("writer task failed: peer={peer:?}, error={err}"),
    }
    info!("connection closed: peer={peer:?}");
    result
}
