//! Bounded worker pool used for admission control.
//!
//! A fixed set of worker tasks pull jobs from a bounded queue. Submission
//! never waits: when every worker is busy and the queue is full the job is
//! handed back to the caller, which decides how to respond. Shutting down
//! refuses new jobs but finishes every job already admitted.

mod config;

use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

pub use config::{DEFAULT_QUEUE_CAPACITY, PoolConfig, PoolConfigError};
use futures::{FutureExt, future::BoxFuture};
use log::{debug, error};
use thiserror::Error;
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::panic::describe_panic;

/// Unit of work executed by a worker.
pub type Job = BoxFuture<'static, ()>;

/// A submission the pool did not accept. The job is returned unexecuted.
#[derive(Error)]
pub enum PoolError {
    /// Every worker is busy and the queue is full.
    #[error("worker pool saturated")]
    Saturated(Job),
    /// The pool has been shut down.
    #[error("worker pool shut down")]
    ShutDown(Job),
}

impl PoolError {
    /// Recover the rejected job.
    #[must_use]
    pub fn into_job(self) -> Job {
        match self {
            Self::Saturated(job) | Self::ShutDown(job) => job,
        }
    }
}

impl fmt::Debug for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saturated(_) => f.write_str("Saturated(<job>)"),
            Self::ShutDown(_) => f.write_str("ShutDown(<job>)"),
        }
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers currently running a job.
    pub active: usize,
    /// Worker tasks spawned.
    pub pool_size: usize,
    /// Configured core size.
    pub core_size: usize,
    /// Configured maximum size.
    pub max_size: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Jobs finished since the pool started.
    pub completed: u64,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    completed: AtomicU64,
}

struct PoolInner {
    tx: mpsc::Sender<Job>,
    config: PoolConfig,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Handle to a shared worker pool. Clones refer to the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawn `config.max_workers` workers on the current Tokio runtime.
    ///
    /// Workers exit once every handle is dropped or [`shutdown`] is called.
    ///
    /// [`shutdown`]: Self::shutdown
    ///
    /// # Errors
    ///
    /// Returns [`PoolConfigError`] if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, PoolConfigError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        for id in 0..config.max_workers {
            tracker.spawn(worker_loop(
                id,
                Arc::clone(&rx),
                Arc::clone(&counters),
                shutdown.clone(),
            ));
        }
        tracker.close();
        debug!(
            "worker pool started: workers={}, queue_capacity={}",
            config.max_workers, config.queue_capacity
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                tx,
                config,
                counters,
                shutdown,
                tracker,
            }),
        })
    }

    /// Queue `job` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Saturated`] when no worker or queue slot is
    /// free and [`PoolError::ShutDown`] after [`shutdown`](Self::shutdown).
    /// Either way the job comes back unexecuted.
    pub fn try_submit(&self, job: Job) -> Result<(), PoolError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown(job));
        }
        self.inner.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) => PoolError::Saturated(job),
            TrySendError::Closed(job) => PoolError::ShutDown(job),
        })
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let tx = &self.inner.tx;
        PoolStats {
            active: self.inner.counters.active.load(Ordering::Relaxed),
            pool_size: self.inner.config.max_workers,
            core_size: self.inner.config.core_workers,
            max_size: self.inner.config.max_workers,
            queued: tx.max_capacity() - tx.capacity(),
            completed: self.inner.counters.completed.load(Ordering::Relaxed),
        }
    }

    /// Configuration the pool was started with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig { &self.inner.config }

    /// Stop accepting jobs and wait for admitted jobs to finish.
    ///
    /// Jobs already queued still run before this returns.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.wait().await;
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    rx.close();
                    rx.recv().await
                }
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else { break };
        counters.active.fetch_add(1, Ordering::Relaxed);
        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            error!(
                "worker job panicked: worker={id}, panic={}",
                describe_panic(panic.as_ref())
            );
        }
        counters.active.fetch_sub(1, Ordering::Relaxed);
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
    debug!("worker exiting: worker={id}");
}
