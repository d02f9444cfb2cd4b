//! Sizing for [`WorkerPool`](super::WorkerPool).

use serde::Deserialize;
use thiserror::Error;

/// Default capacity of the admission queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Invalid pool sizing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolConfigError {
    /// A worker count was zero.
    #[error("worker count must be at least 1")]
    NoWorkers,
    /// The core size exceeds the maximum size.
    #[error("core workers ({core}) exceed max workers ({max})")]
    CoreExceedsMax {
        /// Configured core size.
        core: usize,
        /// Configured maximum size.
        max: usize,
    },
    /// The admission queue had zero capacity.
    #[error("queue capacity must be at least 1")]
    NoQueue,
}

/// Worker pool sizing.
///
/// `max_workers` tasks are spawned. `core_workers` is carried for
/// diagnostics so statistics line up with what operators configured.
///
/// # Examples
///
/// ```
/// use wiredispatch::pool::PoolConfig;
///
/// let config = PoolConfig::default().workers(4).queue_capacity(16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_workers, 4);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers expected to be busy under normal load.
    pub core_workers: usize,
    /// Worker tasks spawned.
    pub max_workers: usize,
    /// Jobs that may wait for a free worker before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            core_workers: workers,
            max_workers: workers,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Set both the core and maximum worker counts.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.core_workers = count;
        self.max_workers = count;
        self
    }

    /// Set the core worker count reported in statistics.
    #[must_use]
    pub fn core_workers(mut self, count: usize) -> Self {
        self.core_workers = count;
        self
    }

    /// Set the number of worker tasks spawned.
    #[must_use]
    pub fn max_workers(mut self, count: usize) -> Self {
        self.max_workers = count;
        self
    }

    /// Set how many jobs may wait for a free worker.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Check the sizing is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PoolConfigError`] for zero sizes or when `core_workers`
    /// exceeds `max_workers`.
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.core_workers == 0 || self.max_workers == 0 {
            return Err(PoolConfigError::NoWorkers);
        }
        if self.core_workers > self.max_workers {
            return Err(PoolConfigError::CoreExceedsMax {
                core: self.core_workers,
                max: self.max_workers,
            });
        }
        if self.queue_capacity == 0 {
            return Err(PoolConfigError::NoQueue);
        }
        Ok(())
    }
}
