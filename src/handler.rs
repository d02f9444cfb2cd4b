//! Business-facing seams of the dispatcher.
//!
//! [`MessageHandler`] produces replies for requests; [`ResponseSink`]
//! receives responses to calls this endpoint issued.

use std::{error::Error, future::Future, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    channel::Channel,
    message::{Request, Response},
    reply::Reply,
};

/// Error type returned by handlers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Value produced by a handler.
///
/// A prebuilt [`Reply`] is sent as is (after identity stamping); anything
/// else is wrapped in a successful reply.
#[derive(Debug)]
pub enum HandlerResult {
    Value(Bytes),
    Reply(Reply),
}

impl From<Reply> for HandlerResult {
    fn from(reply: Reply) -> Self { Self::Reply(reply) }
}

impl From<Bytes> for HandlerResult {
    fn from(value: Bytes) -> Self { Self::Value(value) }
}

impl From<Vec<u8>> for HandlerResult {
    fn from(value: Vec<u8>) -> Self { Self::Value(value.into()) }
}

impl From<&'static str> for HandlerResult {
    fn from(value: &'static str) -> Self { Self::Value(Bytes::from_static(value.as_bytes())) }
}

impl From<String> for HandlerResult {
    fn from(value: String) -> Self { Self::Value(value.into()) }
}

/// Business logic invoked once per request.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Produce the result for `request`, received on `channel`.
    ///
    /// # Errors
    ///
    /// Any error is converted into a handler-failure reply.
    async fn handle(
        &self,
        channel: &dyn Channel,
        request: &Request,
    ) -> Result<HandlerResult, HandlerError>;
}

/// Client-side collaborator completing pending calls.
///
/// Implementations match the response to a waiting caller by request id.
pub trait ResponseSink: Send + Sync + 'static {
    /// Deliver a decoded response, or a locally built error response.
    fn deliver(&self, response: Response);
}

impl<T: ResponseSink + ?Sized> ResponseSink for Arc<T> {
    fn deliver(&self, response: Response) { (**self).deliver(response); }
}

/// Adapter turning an async closure into a [`MessageHandler`].
///
/// ```
/// use wiredispatch::handler::{HandlerResult, handler_fn};
///
/// let handler = handler_fn(|request| async move {
///     Ok::<_, wiredispatch::handler::HandlerError>(HandlerResult::Value(
///         request.arguments().clone(),
///     ))
/// });
/// # let _ = handler;
/// ```
pub struct HandlerFn<F>(F);

/// Wrap `f` as a [`MessageHandler`]. The closure receives an owned copy of
/// the request.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerResult, HandlerError>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerResult, HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        _channel: &dyn Channel,
        request: &Request,
    ) -> Result<HandlerResult, HandlerError> {
        (self.0)(request.clone()).await
    }
}
