//! Wire frames as handed over by the transport layer.
//!
//! A [`WireFrame`] is one complete, length-delimited message whose payload
//! has not yet been decoded. The transport stamps the arrival time; the
//! dispatcher never mutates a frame.

mod codec;
mod header;
mod version;

use std::time::Instant;

use bytes::Bytes;

pub use codec::{DEFAULT_MAX_PAYLOAD_LEN, FrameCodec};
pub use header::{FLAG_REQUEST, FRAME_MAGIC, FrameHeader, FramingError, HEADER_LEN};
pub use version::{V1_HEADER_LEN, VersionTag};

/// One framed message awaiting dispatch.
#[derive(Clone, Debug)]
pub struct WireFrame {
    request_id: u64,
    version: VersionTag,
    is_request: bool,
    payload: Bytes,
    received_at: Instant,
}

impl WireFrame {
    /// Build a frame stamped with the current time.
    #[must_use]
    pub fn new(
        request_id: u64,
        version: VersionTag,
        is_request: bool,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            request_id,
            version,
            is_request,
            payload: payload.into(),
            received_at: Instant::now(),
        }
    }

    /// Override the arrival timestamp.
    #[must_use]
    pub fn with_received_at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }

    /// Request identifier carried in the header.
    #[must_use]
    pub const fn request_id(&self) -> u64 { self.request_id }

    /// Protocol version tag carried in the header.
    #[must_use]
    pub const fn version(&self) -> VersionTag { self.version }

    /// Whether the frame carries a request rather than a response.
    #[must_use]
    pub const fn is_request(&self) -> bool { self.is_request }

    /// Undecoded payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Time the final byte of the frame was received.
    #[must_use]
    pub const fn received_at(&self) -> Instant { self.received_at }

    /// Total framed length used for byte accounting.
    ///
    /// Adds the fixed header length for versions that carry one. This value
    /// is informational and never used to decode the payload.
    #[must_use]
    pub fn framed_len(&self) -> usize {
        self.payload.len() + self.version.fixed_header_len().unwrap_or(0)
    }
}
