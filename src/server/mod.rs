//! TCP server feeding accepted connections to a shared [`Dispatcher`].
//!
//! One accept loop hands each connection to its own task. All connections
//! share the dispatcher, and with it the worker pool and rejection
//! counter.

mod backoff;
mod error;

use std::{
    future::Future,
    net::{SocketAddr, TcpListener as StdTcpListener},
    panic::AssertUnwindSafe,
};

pub use backoff::BackoffConfig;
pub use error::ServerError;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    signal,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    connection::{ConnectionConfig, Endpoints, serve_connection},
    dispatch::Dispatcher,
    panic::describe_panic,
};

/// Bound TCP server.
pub struct DispatchServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    connection: ConnectionConfig,
    backoff: BackoffConfig,
}

impl DispatchServer {
    /// Bind a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        Ok(Self::from_listener(listener, dispatcher))
    }

    /// Adopt an already-bound standard library listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be registered
    /// with the runtime.
    pub fn from_std_listener(
        listener: StdTcpListener,
        dispatcher: Dispatcher,
    ) -> Result<Self, ServerError> {
        listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(listener).map_err(ServerError::Bind)?;
        Ok(Self::from_listener(listener, dispatcher))
    }

    #[must_use]
    pub fn from_listener(listener: TcpListener, dispatcher: Dispatcher) -> Self {
        Self {
            listener,
            dispatcher,
            connection: ConnectionConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }

    /// Limits applied to every accepted connection.
    #[must_use]
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Retry timing for failed accepts.
    #[must_use]
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config.normalized();
        self
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Listener`] if the socket cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> { Ok(self.listener.local_addr()?) }

    /// Serve until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept failures are retried.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves, then close every connection and
    /// wait for their tasks to finish.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept failures are retried with
    /// exponential back-off.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let accept = AcceptLoop {
            listener: &self.listener,
            dispatcher: &self.dispatcher,
            connection: self.connection,
            backoff: self.backoff.normalized(),
            shutdown: &token,
            tracker: &tracker,
        };

        tokio::select! {
            () = shutdown => {},
            () = accept.run() => {},
        }
        token.cancel();
        tracker.close();
        tracker.wait().await;
        debug!("server stopped");
        Ok(())
    }
}

struct AcceptLoop<'a> {
    listener: &'a TcpListener,
    dispatcher: &'a Dispatcher,
    connection: ConnectionConfig,
    backoff: BackoffConfig,
    shutdown: &'a CancellationToken,
    tracker: &'a TaskTracker,
}

impl AcceptLoop<'_> {
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn run(&self) {
        let mut delay = self.backoff.initial_delay;
        loop {
            let accepted = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => return,
                res = self.listener.accept() => res,
            };
            match accepted {
                Ok((stream, peer)) => {
                    self.spawn_connection(stream, peer);
                    delay = self.backoff.initial_delay;
                }
                Err(e) => {
                    let local_addr = self.listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    sleep(delay).await;
                    delay = self.backoff.next_delay(delay);
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let local = stream.local_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY: peer={peer}, error={e}");
        }
        let endpoints = Endpoints {
            peer: Some(peer),
            local,
        };
        let task = serve_connection(
            stream,
            endpoints,
            self.dispatcher.clone(),
            self.connection,
            self.shutdown.clone(),
        );
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!("connection ended with error: peer={peer}, error={err}"),
                Err(panic) => {
                    crate::metrics::inc_connection_panics();
                    let panic_msg = describe_panic(panic.as_ref());
                    error!("connection task panicked: panic={panic_msg}, peer_addr={peer}");
                    tracing::error!(panic = %panic_msg, peer_addr = %peer, "connection task panicked");
                }
            }
        });
    }
}
