//! Test doubles for exercising a [`Dispatcher`](wiredispatch::Dispatcher)
//! without sockets.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use wiredispatch_testing::{RecordingChannel, request_frame};
//! use wiredispatch::{Request, VersionTag};
//!
//! let channel = Arc::new(RecordingChannel::new());
//! let frame = request_frame(&Request::new(1, VersionTag::V1, "svc", "m", &b"x"[..]));
//! assert!(frame.is_request());
//! # let _ = channel;
//! ```

mod channel;
mod codec;
mod frames;
pub mod logging;
mod sink;

pub use channel::{CompletionMode, RecordingChannel};
pub use codec::{DecodeScript, ScriptedCodec};
pub use frames::{decode_reply, request_frame, response_frame};
pub use logging::{LoggerHandle, logger};
pub use sink::RecordingSink;
