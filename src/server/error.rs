//! Errors raised by [`DispatchServer`](super::DispatchServer).

use std::io;

use thiserror::Error;

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound or configured.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
    /// The bound listener could not be queried.
    #[error("listener error: {0}")]
    Listener(#[from] io::Error),
}
