//! Stream codec turning bytes into [`WireFrame`]s and writing framed
//! replies back out.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{FrameHeader, FramingError, HEADER_LEN, WireFrame};

/// Default maximum payload accepted from a peer (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Decoder for the fixed-header frame format.
///
/// Frames are stamped with their arrival time as soon as the final payload
/// byte is buffered.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_payload_len: usize,
}

impl FrameCodec {
    /// Create a codec accepting payloads up to `max_payload_len` bytes.
    #[must_use]
    pub const fn new(max_payload_len: usize) -> Self { Self { max_payload_len } }

    /// Maximum payload length accepted by this codec.
    #[must_use]
    pub const fn max_payload_len(&self) -> usize { self.max_payload_len }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_PAYLOAD_LEN) }
}

impl Decoder for FrameCodec {
    type Item = WireFrame;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = FrameHeader::peek(src)? else {
            return Ok(None);
        };
        let payload_len = header.payload_len as usize;
        if payload_len > self.max_payload_len {
            return Err(FramingError::Oversized {
                size: payload_len,
                max: self.max_payload_len,
            });
        }
        let total = HEADER_LEN + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len).freeze();
        Ok(Some(WireFrame::new(
            header.request_id,
            header.version,
            header.is_request,
            payload,
        )))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FramingError::Truncated {
                buffered: src.len(),
            }),
        }
    }
}

/// Outbound frames arrive fully framed from the codec layer; the encoder
/// only checks the payload bound before copying them to the stream.
impl Encoder<Bytes> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = item.len().saturating_sub(HEADER_LEN);
        if payload_len > self.max_payload_len {
            return Err(FramingError::Oversized {
                size: payload_len,
                max: self.max_payload_len,
            });
        }
        dst.extend_from_slice(&item);
        Ok(())
    }
}
