//! Fixed-size header preceding every payload on a stream transport.
//!
//! Layout (big-endian):
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 2    | magic `0xF1F1` |
//! | 2      | 1    | version tag    |
//! | 3      | 1    | flags          |
//! | 4      | 8    | request id     |
//! | 12     | 4    | payload length |

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::VersionTag;

/// Magic number opening every frame.
pub const FRAME_MAGIC: u16 = 0xF1F1;
/// Encoded size of [`FrameHeader`].
pub const HEADER_LEN: usize = 16;
/// Flag bit marking the frame as a request.
pub const FLAG_REQUEST: u8 = 0x01;

/// Errors raised while delimiting frames on a stream.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The header did not start with [`FRAME_MAGIC`].
    #[error("bad frame magic: {0:#06x}")]
    BadMagic(u16),
    /// The header carried a version byte this endpoint does not speak.
    #[error("unknown protocol version byte: {0}")]
    UnknownVersion(u8),
    /// The payload length exceeds the configured maximum.
    #[error("frame payload exceeds max length: {size} > {max}")]
    Oversized {
        /// Payload length announced by the header.
        size: usize,
        /// Maximum payload length accepted.
        max: usize,
    },
    /// The stream closed part-way through a frame.
    #[error("connection closed mid-frame with {buffered} bytes buffered")]
    Truncated {
        /// Bytes buffered when the stream ended.
        buffered: usize,
    },
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Decoded frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version of the payload.
    pub version: VersionTag,
    /// Whether the payload is a request (`true`) or a response.
    pub is_request: bool,
    /// Identifier correlating a response with its request.
    pub request_id: u64,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Append the encoded header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN);
        dst.put_u16(FRAME_MAGIC);
        dst.put_u8(self.version.wire_value());
        dst.put_u8(if self.is_request { FLAG_REQUEST } else { 0 });
        dst.put_u64(self.request_id);
        dst.put_u32(self.payload_len);
    }

    /// Parse a header from the first [`HEADER_LEN`] bytes of `src`.
    ///
    /// Returns `Ok(None)` when fewer than [`HEADER_LEN`] bytes are available.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::BadMagic`] or [`FramingError::UnknownVersion`]
    /// when the header is malformed.
    pub fn peek(src: &[u8]) -> Result<Option<Self>, FramingError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut buf = &src[..HEADER_LEN];
        let magic = buf.get_u16();
        if magic != FRAME_MAGIC {
            return Err(FramingError::BadMagic(magic));
        }
        let raw_version = buf.get_u8();
        let version =
            VersionTag::from_wire(raw_version).ok_or(FramingError::UnknownVersion(raw_version))?;
        let flags = buf.get_u8();
        let request_id = buf.get_u64();
        let payload_len = buf.get_u32();
        Ok(Some(Self {
            version,
            is_request: flags & FLAG_REQUEST != 0,
            request_id,
            payload_len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn arb_version() -> impl Strategy<Value = VersionTag> {
        prop_oneof![
            Just(VersionTag::V1),
            Just(VersionTag::V1Compress),
            Just(VersionTag::V2),
        ]
    }

    proptest! {
        #[test]
        fn encoded_headers_parse_back(
            version in arb_version(),
            is_request in any::<bool>(),
            request_id in any::<u64>(),
            payload_len in any::<u32>(),
        ) {
            let header = FrameHeader { version, is_request, request_id, payload_len };
            let mut buf = BytesMut::new();
            header.encode(&mut buf);
            prop_assert_eq!(buf.len(), HEADER_LEN);
            prop_assert_eq!(FrameHeader::peek(&buf).expect("valid header"), Some(header));
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(HEADER_LEN - 1)]
    fn short_input_waits_for_more(#[case] len: usize) {
        let src = vec![0xF1; len];
        assert!(matches!(FrameHeader::peek(&src), Ok(None)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut src = vec![0u8; HEADER_LEN];
        src[0] = 0xAB;
        src[1] = 0xCD;
        assert!(matches!(
            FrameHeader::peek(&src),
            Err(FramingError::BadMagic(0xABCD))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let header = FrameHeader {
            version: VersionTag::V1,
            is_request: true,
            request_id: 1,
            payload_len: 0,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        buf[2] = 9;
        assert!(matches!(
            FrameHeader::peek(&buf),
            Err(FramingError::UnknownVersion(9))
        ));
    }
}
