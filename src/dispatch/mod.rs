//! Admission control and the dispatch entry point.
//!
//! [`Dispatcher::dispatch`] accepts one [`WireFrame`] and hands it to the
//! worker pool without waiting for capacity. Saturated requests are
//! answered immediately with a service-overload reply; saturated responses
//! are processed on the calling task so they are never lost.

mod pipeline;
mod processor;
mod stats;

use std::sync::Arc;

use log::{debug, error, warn};

pub use self::stats::{RejectionCounter, StatisticCallback, report_statistics};
use crate::{
    channel::Channel,
    codec::Codec,
    error::DispatchError,
    frame::{VersionTag, WireFrame},
    handler::{MessageHandler, ResponseSink},
    message::ErrorPayload,
    metrics::{self, Direction},
    pool::{Job, PoolStats, WorkerPool},
    reply::error_reply,
};

/// Name reported in statistics lines for rejected requests.
pub const REJECT_POOL_NAME: &str = "reject_request_pool";

pub(crate) struct DispatcherInner {
    codec: Arc<dyn Codec>,
    handler: Arc<dyn MessageHandler>,
    sink: Arc<dyn ResponseSink>,
    pool: Option<WorkerPool>,
    rejections: RejectionCounter,
}

/// Entry point for inbound frames. Cheap to clone; clones share the pool
/// and the rejection counter.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    codec: Arc<dyn Codec>,
    handler: Arc<dyn MessageHandler>,
    sink: Arc<dyn ResponseSink>,
    pool: Option<WorkerPool>,
}

impl DispatcherBuilder {
    /// Run frames on `pool` instead of inline on the calling task.
    #[must_use]
    pub fn pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Finish configuration and produce the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                codec: self.codec,
                handler: self.handler,
                sink: self.sink,
                pool: self.pool,
                rejections: RejectionCounter::new(),
            }),
        }
    }
}

impl Dispatcher {
    /// Start building a dispatcher from its collaborators.
    ///
    /// Without [`DispatcherBuilder::pool`] every frame is processed inline.
    pub fn builder<C, H, S>(codec: C, handler: H, sink: S) -> DispatcherBuilder
    where
        C: Codec,
        H: MessageHandler,
        S: ResponseSink,
    {
        DispatcherBuilder {
            codec: Arc::new(codec),
            handler: Arc::new(handler),
            sink: Arc::new(sink),
            pool: None,
        }
    }

    /// Dispatch one frame received on `channel`.
    ///
    /// Never waits for worker capacity. In pool mode this returns once the
    /// frame is queued, answered with an overload reply, or (for responses
    /// only) processed inline.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedMessageType`] when a frame
    /// processed inline decodes to neither a request nor a response. The
    /// caller must close the connection. Frames processed by a worker close
    /// the channel themselves on such errors.
    pub async fn dispatch(
        &self,
        channel: Arc<dyn Channel>,
        frame: WireFrame,
    ) -> Result<(), DispatchError> {
        metrics::inc_frames(Direction::Inbound);
        debug!(
            "dispatching frame: request_id={}, is_request={}, len={}",
            frame.request_id(),
            frame.is_request(),
            frame.payload().len()
        );
        let Some(pool) = &self.inner.pool else {
            return self.inner.process(channel.as_ref(), frame).await;
        };

        let request_id = frame.request_id();
        let version = frame.version();
        let is_request = frame.is_request();
        let job = self.job(Arc::clone(&channel), frame);
        match pool.try_submit(job) {
            Ok(()) => Ok(()),
            Err(rejected) if is_request => {
                drop(rejected);
                self.reject_request(channel.as_ref(), request_id, version, &pool.stats());
                Ok(())
            }
            Err(rejected) => {
                let stats = pool.stats();
                warn!(
                    "worker pool saturated, processing response inline: request_id={request_id}, \
                     {}",
                    occupancy(&stats)
                );
                rejected.into_job().await;
                Ok(())
            }
        }
    }

    fn job(&self, channel: Arc<dyn Channel>, frame: WireFrame) -> Job {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if let Err(err) = inner.process(channel.as_ref(), frame).await
                && err.closes_connection()
            {
                channel.close();
            }
        })
    }

    fn reject_request(
        &self,
        channel: &dyn Channel,
        request_id: u64,
        version: VersionTag,
        stats: &PoolStats,
    ) {
        let local = channel
            .local_addr()
            .map_or_else(|| "unknown".to_owned(), |addr| addr.to_string());
        let reply = error_reply(request_id, version, ErrorPayload::service_overload(&local));
        self.inner.send_reply(channel, reply);
        self.inner.rejections.increment();
        metrics::inc_rejections();
        let err = DispatchError::OverloadRejection { request_id };
        metrics::inc_errors(err.label());
        error!(
            "{err}: remote={:?}, {}",
            channel.remote_addr(),
            occupancy(stats)
        );
    }

    /// Requests rejected since the last statistics poll.
    #[must_use]
    pub fn rejections(&self) -> &RejectionCounter { &self.inner.rejections }

    /// The worker pool, when one is configured.
    #[must_use]
    pub fn pool(&self) -> Option<&WorkerPool> { self.inner.pool.as_ref() }
}

impl StatisticCallback for Dispatcher {
    fn statistic_callback(&self) -> Option<String> {
        let rejected = self.inner.rejections.drain();
        if rejected == 0 {
            return None;
        }
        let total = self
            .inner
            .pool
            .as_ref()
            .map_or(0, |pool| pool.stats().pool_size);
        Some(format!(
            "type: rpc name: {REJECT_POOL_NAME} total_count: {total} reject_count: {rejected}"
        ))
    }
}

fn occupancy(stats: &PoolStats) -> String {
    format!(
        "active={}, pool_size={}, core_size={}, max_size={}, queued={}, completed={}",
        stats.active, stats.pool_size, stats.core_size, stats.max_size, stats.queued, stats.completed
    )
}
