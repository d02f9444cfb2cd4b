//! Open connection accounting.

use std::sync::atomic::{AtomicU64, Ordering};

static OPEN_CONNECTIONS: AtomicU64 = AtomicU64::new(0);

/// Held for the lifetime of a served connection; keeps the process-wide
/// count and the connections gauge in step.
pub(super) struct ConnectionGuard;

impl ConnectionGuard {
    pub(super) fn acquire() -> Self {
        OPEN_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        OPEN_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Connections currently being served by this process.
#[must_use]
pub fn open_connections() -> u64 { OPEN_CONNECTIONS.load(Ordering::Relaxed) }
