//! Payload codecs.
//!
//! A [`Codec`] turns frame payloads into [`DecodedMessage`]s and replies into
//! complete, framed byte buffers ready for [`Channel::write`].

mod bincode_codec;

use std::{error::Error, sync::Arc};

use bytes::Bytes;
use thiserror::Error;

pub use bincode_codec::BincodeCodec;
use crate::{channel::Channel, message::DecodedMessage, reply::Reply};

/// Errors raised while encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[source] Box<dyn Error + Send + Sync>),
    /// The reply could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[source] Box<dyn Error + Send + Sync>),
    /// The encoded payload does not fit in a frame.
    #[error("payload of {size} bytes exceeds the frame limit of {max}")]
    PayloadTooLarge {
        /// Encoded payload size.
        size: usize,
        /// Largest payload a frame can carry.
        max: usize,
    },
}

impl CodecError {
    /// Wrap any error as a decode failure.
    pub fn decode(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Decode(error.into())
    }

    /// Wrap any error as an encode failure.
    pub fn encode(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Encode(error.into())
    }
}

/// Serialization boundary between frames and domain messages.
///
/// Implementations must be cheap to share across worker tasks.
pub trait Codec: Send + Sync + 'static {
    /// Decode a frame payload received on `channel` from `peer_ip`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the payload is malformed.
    fn decode(
        &self,
        channel: &dyn Channel,
        peer_ip: &str,
        payload: &[u8],
    ) -> Result<DecodedMessage, CodecError>;

    /// Encode `reply` into a complete frame, header included.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the reply cannot be serialized.
    fn encode(&self, channel: &dyn Channel, reply: &Reply) -> Result<Bytes, CodecError>;
}

impl<T: Codec + ?Sized> Codec for Arc<T> {
    fn decode(
        &self,
        channel: &dyn Channel,
        peer_ip: &str,
        payload: &[u8],
    ) -> Result<DecodedMessage, CodecError> {
        (**self).decode(channel, peer_ip, payload)
    }

    fn encode(&self, channel: &dyn Channel, reply: &Reply) -> Result<Bytes, CodecError> {
        (**self).encode(channel, reply)
    }
}
