//! Decoded messages exchanged over a connection.
//!
//! The codec turns a frame payload into a [`DecodedMessage`]. Requests flow
//! into the request pipeline; responses are forwarded to the client-side
//! [`ResponseSink`](crate::handler::ResponseSink).

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

use bytes::Bytes;

use crate::frame::VersionTag;

/// String metadata travelling alongside a message.
pub type Attachments = BTreeMap<String, String>;

/// Attachment key holding the resolved peer host of a request.
pub const ATTACHMENT_HOST: &str = "host";
/// Attachment key holding the framed byte length of a message.
pub const ATTACHMENT_CONTENT_LENGTH: &str = "content_length";

/// Points in a message's life recorded for latency diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// The server received the request frame.
    ServerReceive,
    /// A worker started executing the request.
    ExecutorStart,
    /// The server finished decoding the request.
    ServerDecode,
    /// The handler finished processing.
    Process,
    /// The reply write completed.
    ServerSend,
    /// The client received the response frame.
    ClientReceive,
    /// The client finished decoding the response.
    ClientDecode,
}

/// Ordered list of trace marks.
#[derive(Clone, Debug, Default)]
pub struct Trace(Vec<(TraceEvent, Instant)>);

impl Trace {
    /// Record `event` at the current instant.
    pub fn mark(&mut self, event: TraceEvent) { self.mark_at(event, Instant::now()); }

    /// Record `event` at `at`.
    pub fn mark_at(&mut self, event: TraceEvent, at: Instant) { self.0.push((event, at)); }

    /// Instant at which `event` was first recorded.
    #[must_use]
    pub fn get(&self, event: TraceEvent) -> Option<Instant> {
        self.0
            .iter()
            .find_map(|(recorded, at)| (*recorded == event).then_some(*at))
    }

    /// Iterate over recorded marks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(TraceEvent, Instant)> { self.0.iter() }
}

/// An inbound call awaiting a reply.
#[derive(Clone, Debug)]
pub struct Request {
    request_id: u64,
    version: VersionTag,
    service: String,
    method: String,
    arguments: Bytes,
    attachments: Attachments,
    trace: Trace,
}

impl Request {
    /// Create a request with empty attachments.
    #[must_use]
    pub fn new(
        request_id: u64,
        version: VersionTag,
        service: impl Into<String>,
        method: impl Into<String>,
        arguments: impl Into<Bytes>,
    ) -> Self {
        Self {
            request_id,
            version,
            service: service.into(),
            method: method.into(),
            arguments: arguments.into(),
            attachments: Attachments::new(),
            trace: Trace::default(),
        }
    }

    /// Replace the attachment map.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub const fn request_id(&self) -> u64 { self.request_id }

    #[must_use]
    pub const fn version(&self) -> VersionTag { self.version }

    #[must_use]
    pub fn service(&self) -> &str { &self.service }

    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Opaque, codec-specific argument bytes.
    #[must_use]
    pub fn arguments(&self) -> &Bytes { &self.arguments }

    #[must_use]
    pub fn attachments(&self) -> &Attachments { &self.attachments }

    /// Look up a single attachment.
    #[must_use]
    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    /// Insert or replace an attachment.
    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn trace(&self) -> &Trace { &self.trace }

    pub fn trace_mut(&mut self) -> &mut Trace { &mut self.trace }
}

/// Category of a structured error reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The payload could not be decoded.
    DecodeFailure,
    /// The business handler failed.
    HandlerFailure,
    /// The worker pool was saturated and the request was not executed.
    ServiceOverload,
    /// Any other framework-level failure.
    Framework,
}

impl ErrorKind {
    /// Stable numeric code carried on the wire.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::DecodeFailure => 10_001,
            Self::HandlerFailure => 10_002,
            Self::ServiceOverload => 10_003,
            Self::Framework => 10_000,
        }
    }

    /// Resolve a wire code; unknown codes map to [`ErrorKind::Framework`].
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            10_001 => Self::DecodeFailure,
            10_002 => Self::HandlerFailure,
            10_003 => Self::ServiceOverload,
            _ => Self::Framework,
        }
    }
}

/// Structured error carried by a failed reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPayload {
    kind: ErrorKind,
    message: String,
    retryable: bool,
}

impl ErrorPayload {
    /// Build a non-retryable error of `kind`.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    /// The payload of a frame could not be decoded.
    #[must_use]
    pub fn decode_failure(cause: &dyn fmt::Display) -> Self {
        Self::new(ErrorKind::DecodeFailure, format!("decode fail. errMsg:{cause}"))
    }

    /// The business handler failed or panicked.
    #[must_use]
    pub fn handler_failure(cause: &dyn fmt::Display) -> Self {
        Self::new(
            ErrorKind::HandlerFailure,
            format!("process request fail. errMsg:{cause}"),
        )
    }

    /// The worker pool rejected the request.
    #[must_use]
    pub fn service_overload(local_addr: &dyn fmt::Display) -> Self {
        Self::new(
            ErrorKind::ServiceOverload,
            format!("process thread pool is full, reject by server: {local_addr}"),
        )
    }

    /// Mark the error as safe for the caller to retry.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind { self.kind }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }

    #[must_use]
    pub const fn retryable(&self) -> bool { self.retryable }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

/// Result carried by a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Successful result bytes.
    Value(Bytes),
    /// Structured failure.
    Error(ErrorPayload),
}

impl Outcome {
    /// Error payload, if the outcome is a failure.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Error(error) => Some(error),
            Self::Value(_) => None,
        }
    }

    /// Value bytes, if the outcome is a success.
    #[must_use]
    pub fn value(&self) -> Option<&Bytes> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }
}

/// A completed call, as seen by the peer that issued the request.
#[derive(Clone, Debug)]
pub struct Response {
    request_id: u64,
    version: VersionTag,
    process_time: Duration,
    outcome: Outcome,
    attachments: Attachments,
    trace: Trace,
}

impl Response {
    #[must_use]
    pub fn new(request_id: u64, version: VersionTag, outcome: Outcome) -> Self {
        Self {
            request_id,
            version,
            process_time: Duration::ZERO,
            outcome,
            attachments: Attachments::new(),
            trace: Trace::default(),
        }
    }

    /// Set the server-side processing time.
    #[must_use]
    pub fn with_process_time(mut self, process_time: Duration) -> Self {
        self.process_time = process_time;
        self
    }

    /// Replace the attachment map.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub const fn request_id(&self) -> u64 { self.request_id }

    #[must_use]
    pub const fn version(&self) -> VersionTag { self.version }

    #[must_use]
    pub const fn process_time(&self) -> Duration { self.process_time }

    #[must_use]
    pub fn outcome(&self) -> &Outcome { &self.outcome }

    #[must_use]
    pub fn attachments(&self) -> &Attachments { &self.attachments }

    #[must_use]
    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn trace(&self) -> &Trace { &self.trace }

    pub fn trace_mut(&mut self) -> &mut Trace { &mut self.trace }

    pub(crate) fn stamp(&mut self, request_id: u64, version: VersionTag, process_time: Duration) {
        self.request_id = request_id;
        self.version = version;
        self.process_time = process_time;
    }
}

/// Result of decoding a frame payload.
#[derive(Debug)]
pub enum DecodedMessage {
    Request(Request),
    Response(Response),
    /// The codec produced something that is neither a request nor a
    /// response. The framing contract is violated and no reply is possible.
    Unsupported {
        /// Name of the unexpected message type, for diagnostics.
        type_name: String,
    },
}
