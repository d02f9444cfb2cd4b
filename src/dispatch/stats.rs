//! Rejection accounting and periodic statistics reporting.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::info;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Source of a periodic statistics line.
pub trait StatisticCallback: Send + Sync {
    /// Render accumulated statistics, or `None` when there is nothing to
    /// report. Implementations may reset their counters.
    fn statistic_callback(&self) -> Option<String>;
}

/// Count of requests rejected since the last poll.
#[derive(Debug, Default)]
pub struct RejectionCounter(AtomicU64);

impl RejectionCounter {
    #[must_use]
    pub const fn new() -> Self { Self(AtomicU64::new(0)) }

    /// Record one rejection.
    pub fn increment(&self) { self.0.fetch_add(1, Ordering::Relaxed); }

    /// Read and reset the count in one step.
    pub fn drain(&self) -> u64 { self.0.swap(0, Ordering::AcqRel) }

    /// Current count, without resetting it.
    #[must_use]
    pub fn peek(&self) -> u64 { self.0.load(Ordering::Relaxed) }
}

/// Poll every callback each `period` and log what they report at info
/// level, until `shutdown` fires.
///
/// The first poll happens one full period after the call.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn report_statistics(
    callbacks: Vec<Arc<dyn StatisticCallback>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for line in callbacks.iter().filter_map(|cb| cb.statistic_callback()) {
                    info!("[statistic] {line}");
                }
            }
        }
    }
}
