//! Outbound replies and the error reply builder.
//!
//! A [`Reply`] is produced exactly once for every request that enters the
//! request pipeline. [`Reply::finish`] consumes the reply, so its finish
//! hooks can run at most once; the pipeline guarantees they run at least
//! once whether the write succeeds, fails, or is skipped.

use std::{fmt, time::Duration};

use bytes::Bytes;

use crate::{
    frame::VersionTag,
    message::{Attachments, ErrorPayload, Outcome, Response, Trace},
};

/// How a reply's lifecycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishStatus {
    /// The encoded reply was written to the connection.
    Sent,
    /// The write was attempted and failed.
    WriteFailed,
    /// No write was attempted (closed connection or encode failure).
    Skipped,
}

type FinishHook = Box<dyn FnOnce(&Response, FinishStatus) + Send + 'static>;

/// Reply to a single request.
pub struct Reply {
    response: Response,
    finish_hooks: Vec<FinishHook>,
}

impl Reply {
    /// Wrap a raw handler value. Identity fields are stamped by the pipeline.
    #[must_use]
    pub fn value(value: impl Into<Bytes>) -> Self {
        Self::from_response(Response::new(0, VersionTag::V1, Outcome::Value(value.into())))
    }

    /// Build a failed reply. Identity fields are stamped by the pipeline.
    #[must_use]
    pub fn error(error: ErrorPayload) -> Self {
        Self::from_response(Response::new(0, VersionTag::V1, Outcome::Error(error)))
    }

    fn from_response(response: Response) -> Self {
        Self {
            response,
            finish_hooks: Vec::new(),
        }
    }

    /// Register `hook` to run once when the reply's lifecycle ends.
    ///
    /// Hooks run in registration order on whichever task observes the
    /// completion of the write, and see the reply as it was finished.
    pub fn on_finish<F>(&mut self, hook: F)
    where
        F: FnOnce(&Response, FinishStatus) + Send + 'static,
    {
        self.finish_hooks.push(Box::new(hook));
    }

    /// End the reply's lifecycle, running every finish hook.
    pub fn finish(self, status: FinishStatus) {
        let Self {
            response,
            finish_hooks,
        } = self;
        for hook in finish_hooks {
            hook(&response, status);
        }
    }

    /// Copy identity from the originating request and record the
    /// processing time.
    pub fn stamp(&mut self, request_id: u64, version: VersionTag, process_time: Duration) {
        self.response.stamp(request_id, version, process_time);
    }

    #[must_use]
    pub fn request_id(&self) -> u64 { self.response.request_id() }

    #[must_use]
    pub fn version(&self) -> VersionTag { self.response.version() }

    #[must_use]
    pub fn process_time(&self) -> Duration { self.response.process_time() }

    #[must_use]
    pub fn outcome(&self) -> &Outcome { self.response.outcome() }

    #[must_use]
    pub fn attachments(&self) -> &Attachments { self.response.attachments() }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.response.set_attachment(key, value);
    }

    #[must_use]
    pub fn trace(&self) -> &Trace { self.response.trace() }

    pub fn trace_mut(&mut self) -> &mut Trace { self.response.trace_mut() }

    /// Borrow the reply as the response the peer will observe.
    #[must_use]
    pub fn as_response(&self) -> &Response { &self.response }

    /// Convert into a [`Response`] for local delivery.
    ///
    /// Registered finish hooks are dropped without running.
    #[must_use]
    pub fn into_response(self) -> Response { self.response }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("response", &self.response)
            .field("finish_hooks", &self.finish_hooks.len())
            .finish()
    }
}

/// Build a failed reply carrying `request_id` and `version` unchanged.
#[must_use]
pub fn error_reply(request_id: u64, version: VersionTag, cause: ErrorPayload) -> Reply {
    let mut reply = Reply::error(cause);
    reply.stamp(request_id, version, Duration::ZERO);
    reply
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use rstest::rstest;

    use super::*;
    use crate::message::ErrorKind;

    #[rstest]
    #[case(VersionTag::V1)]
    #[case(VersionTag::V2)]
    fn error_reply_keeps_identity(#[case] version: VersionTag) {
        let reply = error_reply(99, version, ErrorPayload::decode_failure(&"bad bytes"));
        assert_eq!(reply.request_id(), 99);
        assert_eq!(reply.version(), version);
        let error = reply.outcome().error().expect("error outcome");
        assert_eq!(error.kind(), ErrorKind::DecodeFailure);
        assert!(error.message().contains("bad bytes"));
    }

    #[test]
    fn finish_runs_hooks_in_order_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut reply = Reply::value("ok");
        for id in 0..3 {
            let order = Arc::clone(&order);
            reply.on_finish(move |_, status| {
                order.lock().expect("lock").push((id, status));
            });
        }
        reply.finish(FinishStatus::Sent);
        let recorded = order.lock().expect("lock").clone();
        assert_eq!(
            recorded,
            vec![
                (0, FinishStatus::Sent),
                (1, FinishStatus::Sent),
                (2, FinishStatus::Sent)
            ]
        );
    }

    #[test]
    fn into_response_drops_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut reply = error_reply(1, VersionTag::V1, ErrorPayload::handler_failure(&"boom"));
        let counter = Arc::clone(&calls);
        reply.on_finish(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let response = reply.into_response();
        assert_eq!(response.request_id(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stamp_copies_request_identity() {
        let mut reply = Reply::value("ok");
        reply.stamp(42, VersionTag::V1Compress, Duration::from_millis(3));
        assert_eq!(reply.request_id(), 42);
        assert_eq!(reply.version(), VersionTag::V1Compress);
        assert_eq!(reply.process_time(), Duration::from_millis(3));
        assert_eq!(reply.outcome().value().map(|v| &v[..]), Some(&b"ok"[..]));
    }
}
