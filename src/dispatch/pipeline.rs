//! Request pipeline: handler invocation, reply normalization, and the
//! asynchronous write back to the peer.

use std::{fmt, panic::AssertUnwindSafe, time::Instant};

use futures::FutureExt;
use log::{debug, error, warn};

use super::DispatcherInner;
use crate::{
    channel::{Channel, peer_host},
    context::RequestContext,
    error::DispatchError,
    handler::HandlerResult,
    message::{ATTACHMENT_CONTENT_LENGTH, ATTACHMENT_HOST, ErrorPayload, Request, TraceEvent},
    metrics::{self, Direction},
    panic::describe_panic,
    reply::{FinishStatus, Reply},
};

impl DispatcherInner {
    /// Run the handler for `request` and send exactly one reply.
    ///
    /// Handler errors and panics become handler-failure replies. The
    /// request context is bound only while the handler runs.
    pub(crate) async fn handle_request(&self, channel: &dyn Channel, mut request: Request) {
        request.set_attachment(ATTACHMENT_HOST, peer_host(channel));
        let started = Instant::now();
        let context = RequestContext::from_request(&request, channel.remote_addr());
        let mut reply = context.scope(self.invoke_handler(channel, &request)).await;
        reply.trace_mut().mark(TraceEvent::Process);
        reply.stamp(request.request_id(), request.version(), started.elapsed());
        tracing::debug!(
            request_id = request.request_id(),
            service = request.service(),
            method = request.method(),
            process_time_us = u64::try_from(reply.process_time().as_micros()).unwrap_or(u64::MAX),
            "request processed"
        );
        self.send_reply(channel, reply);
    }

    async fn invoke_handler(&self, channel: &dyn Channel, request: &Request) -> Reply {
        let outcome = AssertUnwindSafe(self.handler.handle(channel, request))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(HandlerResult::Reply(reply))) => reply,
            Ok(Ok(HandlerResult::Value(value))) => Reply::value(value),
            Ok(Err(cause)) => handler_failure(channel, request, &cause),
            Err(panic) => handler_failure(channel, request, &describe_panic(panic.as_ref())),
        }
    }

    /// Encode and write `reply`, finishing it exactly once.
    ///
    /// When the channel is closed the reply is finished synchronously
    /// with [`FinishStatus::Skipped`]. Otherwise it finishes when the
    /// transport reports the write outcome.
    pub(crate) fn send_reply(&self, channel: &dyn Channel, mut reply: Reply) {
        let request_id = reply.request_id();
        let frame = match self.codec.encode(channel, &reply) {
            Ok(frame) => frame,
            Err(source) => {
                let err = DispatchError::Encode { request_id, source };
                metrics::inc_errors(err.label());
                warn!("{err}: remote={:?}", channel.remote_addr());
                reply.finish(FinishStatus::Skipped);
                return;
            }
        };
        reply.set_attachment(ATTACHMENT_CONTENT_LENGTH, frame.len().to_string());

        if !channel.is_open() {
            debug!("channel closed, reply not written: request_id={request_id}");
            reply.finish(FinishStatus::Skipped);
            return;
        }

        let remote = channel.remote_addr();
        channel.write(frame).on_complete(move |result| {
            reply.trace_mut().mark(TraceEvent::ServerSend);
            match result {
                Ok(()) => {
                    metrics::inc_frames(Direction::Outbound);
                    reply.finish(FinishStatus::Sent);
                }
                Err(source) => {
                    let err = DispatchError::WriteFailure { request_id, source };
                    metrics::inc_errors(err.label());
                    warn!("{err}: remote={remote:?}");
                    reply.finish(FinishStatus::WriteFailed);
                }
            }
        });
    }
}

fn handler_failure(channel: &dyn Channel, request: &Request, cause: &dyn fmt::Display) -> Reply {
    let err = DispatchError::HandlerFailure {
        request_id: request.request_id(),
        message: cause.to_string(),
    };
    metrics::inc_errors(err.label());
    error!(
        "{err}: service={}, method={}, remote={:?}",
        request.service(),
        request.method(),
        channel.remote_addr()
    );
    Reply::error(ErrorPayload::handler_failure(cause))
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use bytes::Bytes;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        channel::WriteCompletion,
        client::PendingCalls,
        codec::BincodeCodec,
        dispatch::Dispatcher,
        frame::{HEADER_LEN, VersionTag, WireFrame},
        handler::{HandlerError, handler_fn},
    };

    #[derive(Default)]
    struct Loopback {
        written: Mutex<Vec<Bytes>>,
    }

    impl Channel for Loopback {
        fn is_open(&self) -> bool { true }

        fn write(&self, frame: Bytes) -> WriteCompletion {
            self.written.lock().expect("lock").push(frame);
            WriteCompletion::ready(Ok(()))
        }

        fn remote_addr(&self) -> Option<SocketAddr> { None }

        fn local_addr(&self) -> Option<SocketAddr> { None }

        fn close(&self) {}
    }

    #[tokio::test]
    #[traced_test]
    async fn processed_request_emits_tracing_event() {
        let dispatcher = Dispatcher::builder(
            BincodeCodec,
            handler_fn(|request: Request| async move {
                Ok::<_, HandlerError>(HandlerResult::Value(request.arguments().clone()))
            }),
            PendingCalls::new(),
        )
        .build();
        let request = Request::new(5, VersionTag::V1, "svc", "echo", &b"hi"[..]);
        let framed = BincodeCodec.encode_request(&request).expect("encode");
        let frame = WireFrame::new(5, VersionTag::V1, true, framed.slice(HEADER_LEN..));
        let channel = Arc::new(Loopback::default());

        dispatcher
            .dispatch(channel.clone(), frame)
            .await
            .expect("dispatch");

        assert_eq!(channel.written.lock().expect("lock").len(), 1);
        assert!(logs_contain("request processed"));
        assert!(logs_contain("request_id=5"));
    }
}
