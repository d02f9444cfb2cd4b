//! Canonical error type for the dispatch core.
//!
//! Decode, handler, and overload failures are recovered into error replies
//! and only surface here for logging and metrics. Unsupported messages and
//! channel faults are returned to the transport, which closes the
//! connection.

use thiserror::Error;

use crate::{channel::WriteError, codec::CodecError, frame::FramingError};

/// Failure observed while dispatching a frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The payload could not be decoded.
    #[error("decode failed for request {request_id}: {source}")]
    DecodeFailure {
        /// Request identifier from the frame header.
        request_id: u64,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
    /// The business handler returned an error or panicked.
    #[error("handler failed for request {request_id}: {message}")]
    HandlerFailure {
        /// Request identifier.
        request_id: u64,
        /// Rendered handler error or panic payload.
        message: String,
    },
    /// The worker pool rejected a request.
    #[error("request {request_id} rejected: worker pool saturated")]
    OverloadRejection {
        /// Identifier of the rejected request.
        request_id: u64,
    },
    /// A reply could not be encoded.
    #[error("failed to encode reply for request {request_id}: {source}")]
    Encode {
        /// Request identifier of the reply.
        request_id: u64,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
    /// Writing a reply failed. Not retried.
    #[error("failed to write reply for request {request_id}: {source}")]
    WriteFailure {
        /// Request identifier of the reply.
        request_id: u64,
        /// Transport failure.
        #[source]
        source: WriteError,
    },
    /// The codec produced neither a request nor a response.
    #[error("unsupported message type: {type_name}")]
    UnsupportedMessageType {
        /// Name of the offending type.
        type_name: String,
    },
    /// The transport failed underneath the dispatcher.
    #[error("channel fault: {0}")]
    ChannelFault(#[from] FramingError),
}

impl DispatchError {
    /// Whether the connection must be closed after this error.
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMessageType { .. } | Self::ChannelFault(_)
        )
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::DecodeFailure { .. } => "decode",
            Self::HandlerFailure { .. } => "handler",
            Self::OverloadRejection { .. } => "overload",
            Self::Encode { .. } => "encode",
            Self::WriteFailure { .. } => "write",
            Self::UnsupportedMessageType { .. } => "unsupported",
            Self::ChannelFault(_) => "channel",
        }
    }
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DispatchError::UnsupportedMessageType { type_name: "Ping".into() }, true)]
    #[case(DispatchError::ChannelFault(FramingError::BadMagic(0)), true)]
    #[case(DispatchError::OverloadRejection { request_id: 1 }, false)]
    #[case(DispatchError::HandlerFailure { request_id: 1, message: "boom".into() }, false)]
    #[case(
        DispatchError::WriteFailure {
            request_id: 1,
            source: WriteError::Io(io::Error::other("reset")),
        },
        false
    )]
    fn only_protocol_violations_close_the_connection(
        #[case] error: DispatchError,
        #[case] closes: bool,
    ) {
        assert_eq!(error.closes_connection(), closes);
    }

    #[test]
    fn display_includes_request_id() {
        let error = DispatchError::OverloadRejection { request_id: 7 };
        assert_eq!(
            error.to_string(),
            "request 7 rejected: worker pool saturated"
        );
    }
}
