//! Pending-call registry completing outbound calls with their responses.

use dashmap::DashMap;
use log::warn;
use tokio::sync::oneshot;

use crate::{handler::ResponseSink, message::Response};

/// Outstanding calls keyed by request id.
///
/// ```
/// use wiredispatch::{
///     client::PendingCalls,
///     frame::VersionTag,
///     handler::ResponseSink,
///     message::{Outcome, Response},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let calls = PendingCalls::new();
/// let waiter = calls.register(7);
/// calls.deliver(Response::new(7, VersionTag::V1, Outcome::Value("pong".into())));
/// let response = waiter.await.expect("delivered");
/// assert_eq!(response.request_id(), 7);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PendingCalls {
    waiters: DashMap<u64, oneshot::Sender<Response>>,
}

impl PendingCalls {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register interest in the response to `request_id`.
    ///
    /// A second registration for the same id replaces the first; the
    /// earlier receiver then resolves with an error.
    pub fn register(&self, request_id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        if self.waiters.insert(request_id, tx).is_some() {
            warn!("replaced pending call: request_id={request_id}");
        }
        rx
    }

    /// Forget `request_id`. Returns whether a call was pending.
    pub fn cancel(&self, request_id: u64) -> bool { self.waiters.remove(&request_id).is_some() }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize { self.waiters.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.waiters.is_empty() }
}

impl ResponseSink for PendingCalls {
    fn deliver(&self, response: Response) {
        let request_id = response.request_id();
        match self.waiters.remove(&request_id) {
            Some((_, waiter)) => {
                if waiter.send(response).is_err() {
                    warn!("caller dropped before response arrived: request_id={request_id}");
                }
            }
            None => warn!("response for unknown request dropped: request_id={request_id}"),
        }
    }
}
