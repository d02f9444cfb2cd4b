//! Ambient per-request context.
//!
//! While a handler runs, the identity of the request it serves is
//! available through [`RequestContext::current`] without threading it
//! through every call. The context is scoped to the handler future and
//! cleared once it completes, so a worker reused for the next request
//! never observes stale state.

use std::{future::Future, net::SocketAddr};

use crate::{
    frame::VersionTag,
    message::{Attachments, Request},
};

tokio::task_local! {
    static CURRENT_REQUEST: RequestContext;
}

/// Snapshot of the request currently being processed.
#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: u64,
    version: VersionTag,
    service: String,
    method: String,
    attachments: Attachments,
    remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    /// Capture the context of `request` received from `remote_addr`.
    #[must_use]
    pub fn from_request(request: &Request, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            request_id: request.request_id(),
            version: request.version(),
            service: request.service().to_owned(),
            method: request.method().to_owned(),
            attachments: request.attachments().clone(),
            remote_addr,
        }
    }

    /// Run `fut` with `self` installed as the current context.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_REQUEST.scope(self, fut).await
    }

    /// Context of the request being handled by the calling task, if any.
    #[must_use]
    pub fn current() -> Option<Self> { CURRENT_REQUEST.try_with(Clone::clone).ok() }

    /// Borrow the current context without cloning it.
    pub fn with_current<R>(f: impl FnOnce(Option<&Self>) -> R) -> R {
        if CURRENT_REQUEST.try_with(|_| ()).is_ok() {
            CURRENT_REQUEST.with(|ctx| f(Some(ctx)))
        } else {
            f(None)
        }
    }

    #[must_use]
    pub const fn request_id(&self) -> u64 { self.request_id }

    #[must_use]
    pub const fn version(&self) -> VersionTag { self.version }

    #[must_use]
    pub fn service(&self) -> &str { &self.service }

    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    #[must_use]
    pub fn attachments(&self) -> &Attachments { &self.attachments }

    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64) -> Request {
        let mut request = Request::new(id, VersionTag::V1, "echo", "say", "hi");
        request.set_attachment("tenant", "blue");
        request
    }

    #[tokio::test]
    async fn context_is_visible_inside_scope_only() {
        assert!(RequestContext::current().is_none());
        let ctx = RequestContext::from_request(&request(5), None);
        let seen = ctx
            .scope(async { RequestContext::current().map(|c| c.request_id()) })
            .await;
        assert_eq!(seen, Some(5));
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn nested_scopes_restore_outer_context() {
        let outer = RequestContext::from_request(&request(1), None);
        let inner = RequestContext::from_request(&request(2), None);
        let ids = outer
            .scope(async move {
                let inner_id = inner
                    .scope(async { RequestContext::current().map(|c| c.request_id()) })
                    .await;
                let outer_id = RequestContext::current().map(|c| c.request_id());
                (inner_id, outer_id)
            })
            .await;
        assert_eq!(ids, (Some(2), Some(1)));
    }

    #[tokio::test]
    async fn attachments_are_captured() {
        let ctx = RequestContext::from_request(&request(3), None);
        let tenant = ctx
            .scope(async {
                RequestContext::with_current(|c| {
                    c.and_then(|c| c.attachments().get("tenant").cloned())
                })
            })
            .await;
        assert_eq!(tenant.as_deref(), Some("blue"));
    }
}
