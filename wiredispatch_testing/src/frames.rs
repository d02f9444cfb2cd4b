//! Building inbound frames and reading written replies.

use bytes::Bytes;
use wiredispatch::{
    BincodeCodec,
    DecodedMessage,
    Request,
    Response,
    WireFrame,
    frame::{FrameHeader, HEADER_LEN},
};

/// Encode `request` with [`BincodeCodec`] and wrap it as an inbound frame.
///
/// # Panics
///
/// Panics if the request cannot be encoded.
#[must_use]
pub fn request_frame(request: &Request) -> WireFrame {
    let framed = BincodeCodec.encode_request(request).expect("encode request");
    WireFrame::new(
        request.request_id(),
        request.version(),
        true,
        framed.slice(HEADER_LEN..),
    )
}

/// Encode `response` with [`BincodeCodec`] and wrap it as an inbound frame.
///
/// # Panics
///
/// Panics if the response cannot be encoded.
#[must_use]
pub fn response_frame(response: &Response) -> WireFrame {
    let framed = BincodeCodec
        .encode_response(response)
        .expect("encode response");
    WireFrame::new(
        response.request_id(),
        response.version(),
        false,
        framed.slice(HEADER_LEN..),
    )
}

/// Decode a reply frame as written to a channel, header included.
///
/// # Panics
///
/// Panics if the bytes are not a well-formed response frame.
#[must_use]
pub fn decode_reply(framed: &Bytes) -> Response {
    let header = FrameHeader::peek(framed)
        .expect("valid header")
        .expect("complete header");
    assert!(!header.is_request, "reply frames carry the response flag");
    match BincodeCodec
        .decode_payload(&framed[HEADER_LEN..])
        .expect("decode reply")
    {
        DecodedMessage::Response(response) => response,
        other => panic!("expected a response, got {other:?}"),
    }
}
