//! Reference codec serializing messages with `bincode`.

use std::time::Duration;

use bincode::{Decode, Encode, config};
use bytes::{Bytes, BytesMut};

use super::{Codec, CodecError};
use crate::{
    channel::Channel,
    frame::{DEFAULT_MAX_PAYLOAD_LEN, FrameHeader, HEADER_LEN, VersionTag},
    message::{Attachments, DecodedMessage, ErrorKind, ErrorPayload, Outcome, Request, Response},
    reply::Reply,
};

#[derive(Debug, Encode, Decode)]
enum WireMessage {
    Request(WireRequest),
    Response(WireResponse),
}

#[derive(Debug, Encode, Decode)]
struct WireRequest {
    request_id: u64,
    version: VersionTag,
    service: String,
    method: String,
    arguments: Vec<u8>,
    attachments: Attachments,
}

#[derive(Debug, Encode, Decode)]
struct WireResponse {
    request_id: u64,
    version: VersionTag,
    process_time_micros: u64,
    outcome: WireOutcome,
    attachments: Attachments,
}

#[derive(Debug, Encode, Decode)]
enum WireOutcome {
    Value(Vec<u8>),
    Error {
        code: u32,
        message: String,
        retryable: bool,
    },
}

impl From<&Outcome> for WireOutcome {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Value(value) => Self::Value(value.to_vec()),
            Outcome::Error(error) => Self::Error {
                code: error.kind().code(),
                message: error.message().to_owned(),
                retryable: error.retryable(),
            },
        }
    }
}

impl From<WireOutcome> for Outcome {
    fn from(outcome: WireOutcome) -> Self {
        match outcome {
            WireOutcome::Value(value) => Self::Value(Bytes::from(value)),
            WireOutcome::Error {
                code,
                message,
                retryable,
            } => Self::Error(
                ErrorPayload::new(ErrorKind::from_code(code), message).with_retryable(retryable),
            ),
        }
    }
}

/// Codec encoding requests and responses with `bincode`'s standard
/// configuration.
///
/// ```
/// use wiredispatch::{
///     codec::BincodeCodec,
///     frame::VersionTag,
///     message::{DecodedMessage, Request},
/// };
///
/// let codec = BincodeCodec;
/// let request = Request::new(7, VersionTag::V1, "echo", "say", &b"hi"[..]);
/// let frame = codec.encode_request(&request).expect("encode");
/// let decoded = codec
///     .decode_payload(&frame[wiredispatch::frame::HEADER_LEN..])
///     .expect("decode");
/// assert!(matches!(decoded, DecodedMessage::Request(r) if r.request_id() == 7));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    /// Decode a payload without channel context.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are malformed, carry
    /// trailing data, or declare collections larger than a frame may hold.
    pub fn decode_payload(&self, payload: &[u8]) -> Result<DecodedMessage, CodecError> {
        let (message, consumed): (WireMessage, usize) =
            bincode::decode_from_slice(
                payload,
                config::standard().with_limit::<DEFAULT_MAX_PAYLOAD_LEN>(),
            )
            .map_err(CodecError::decode)?;
        if consumed != payload.len() {
            return Err(CodecError::decode(format!(
                "{} trailing bytes after message",
                payload.len() - consumed
            )));
        }
        Ok(match message {
            WireMessage::Request(request) => DecodedMessage::Request(
                Request::new(
                    request.request_id,
                    request.version,
                    request.service,
                    request.method,
                    request.arguments,
                )
                .with_attachments(request.attachments),
            ),
            WireMessage::Response(response) => DecodedMessage::Response(
                Response::new(
                    response.request_id,
                    response.version,
                    response.outcome.into(),
                )
                .with_process_time(Duration::from_micros(response.process_time_micros))
                .with_attachments(response.attachments),
            ),
        })
    }

    /// Encode a request into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if serialization fails or the payload is too
    /// large for a frame.
    pub fn encode_request(&self, request: &Request) -> Result<Bytes, CodecError> {
        let message = WireMessage::Request(WireRequest {
            request_id: request.request_id(),
            version: request.version(),
            service: request.service().to_owned(),
            method: request.method().to_owned(),
            arguments: request.arguments().to_vec(),
            attachments: request.attachments().clone(),
        });
        frame_message(request.request_id(), request.version(), true, &message)
    }

    /// Encode a response into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if serialization fails or the payload is too
    /// large for a frame.
    pub fn encode_response(&self, response: &Response) -> Result<Bytes, CodecError> {
        let message = WireMessage::Response(WireResponse {
            request_id: response.request_id(),
            version: response.version(),
            process_time_micros: u64::try_from(response.process_time().as_micros())
                .unwrap_or(u64::MAX),
            outcome: response.outcome().into(),
            attachments: response.attachments().clone(),
        });
        frame_message(response.request_id(), response.version(), false, &message)
    }
}

fn frame_message(
    request_id: u64,
    version: VersionTag,
    is_request: bool,
    message: &WireMessage,
) -> Result<Bytes, CodecError> {
    let body = bincode::encode_to_vec(message, config::standard()).map_err(CodecError::encode)?;
    let payload_len = u32::try_from(body.len()).map_err(|_| CodecError::PayloadTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    FrameHeader {
        version,
        is_request,
        request_id,
        payload_len,
    }
    .encode(&mut buf);
    buf.extend_from_slice(&body);
    Ok(buf.freeze())
}

impl Codec for BincodeCodec {
    fn decode(
        &self,
        _channel: &dyn Channel,
        _peer_ip: &str,
        payload: &[u8],
    ) -> Result<DecodedMessage, CodecError> {
        self.decode_payload(payload)
    }

    fn encode(&self, _channel: &dyn Channel, reply: &Reply) -> Result<Bytes, CodecError> {
        self.encode_response(reply.as_response())
    }
}
