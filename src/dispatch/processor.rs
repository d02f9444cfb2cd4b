//! Decoding and classification of a single frame.

use log::{debug, error};

use super::DispatcherInner;
use crate::{
    channel::{Channel, peer_ip},
    codec::CodecError,
    error::DispatchError,
    frame::WireFrame,
    message::{ATTACHMENT_CONTENT_LENGTH, DecodedMessage, ErrorPayload, Response, TraceEvent},
    metrics,
    reply::error_reply,
};

impl DispatcherInner {
    /// Decode `frame` and route the result to the request pipeline or the
    /// response sink.
    ///
    /// Decode failures are answered (requests) or forwarded (responses) as
    /// error replies and do not surface here.
    pub(crate) async fn process(
        &self,
        channel: &dyn Channel,
        frame: WireFrame,
    ) -> Result<(), DispatchError> {
        let peer = peer_ip(channel);
        let decoded = match self.codec.decode(channel, &peer, frame.payload()) {
            Ok(decoded) => decoded,
            Err(source) => {
                self.on_decode_failure(channel, &frame, source);
                return Ok(());
            }
        };
        let content_length = frame.framed_len().to_string();

        match decoded {
            DecodedMessage::Request(mut request) => {
                let trace = request.trace_mut();
                trace.mark_at(TraceEvent::ServerReceive, frame.received_at());
                trace.mark(TraceEvent::ExecutorStart);
                trace.mark(TraceEvent::ServerDecode);
                request.set_attachment(ATTACHMENT_CONTENT_LENGTH, content_length);
                self.handle_request(channel, request).await;
                Ok(())
            }
            DecodedMessage::Response(mut response) => {
                let trace = response.trace_mut();
                trace.mark_at(TraceEvent::ClientReceive, frame.received_at());
                trace.mark(TraceEvent::ClientDecode);
                response.set_attachment(ATTACHMENT_CONTENT_LENGTH, content_length);
                self.forward_response(response);
                Ok(())
            }
            DecodedMessage::Unsupported { type_name } => {
                let err = DispatchError::UnsupportedMessageType { type_name };
                metrics::inc_errors(err.label());
                error!(
                    "{err}: request_id={}, remote={:?}",
                    frame.request_id(),
                    channel.remote_addr()
                );
                Err(err)
            }
        }
    }

    fn on_decode_failure(
        &self,
        channel: &dyn Channel,
        frame: &WireFrame,
        source: CodecError,
    ) {
        let cause = ErrorPayload::decode_failure(&source);
        let err = DispatchError::DecodeFailure {
            request_id: frame.request_id(),
            source,
        };
        metrics::inc_errors(err.label());
        error!(
            "{err}: remote={:?}, local={:?}, is_request={}",
            channel.remote_addr(),
            channel.local_addr(),
            frame.is_request()
        );
        let reply = error_reply(frame.request_id(), frame.version(), cause);
        if frame.is_request() {
            self.send_reply(channel, reply);
        } else {
            self.forward_response(reply.into_response());
        }
    }

    /// Hand a response to the client-side sink.
    pub(crate) fn forward_response(&self, response: Response) {
        debug!("forwarding response: request_id={}", response.request_id());
        self.sink.deliver(response);
    }
}
