//! Echo RPC server on top of `wiredispatch`.
//!
//! Requests are answered with their own argument bytes. Useful for
//! exercising admission control and the wire format from a client.

mod cli;

use std::{error::Error, sync::Arc, time::Duration};

use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;
use wiredispatch::{
    client::PendingCalls,
    codec::BincodeCodec,
    dispatch::{Dispatcher, StatisticCallback, report_statistics},
    handler::{HandlerError, HandlerResult, handler_fn},
    pool::{PoolConfig, WorkerPool},
    server::DispatchServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Applications embedding the library install their own subscriber.
    tracing_subscriber::fmt::init();
    let cli = cli::Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr)?;
    }

    let mut pool_config = PoolConfig::default().queue_capacity(cli.queue_capacity);
    if let Some(workers) = cli.workers {
        pool_config = pool_config.workers(workers);
    }
    let pool = WorkerPool::new(pool_config)?;
    let echo = handler_fn(|request| async move {
        Ok::<_, HandlerError>(HandlerResult::Value(request.arguments().clone()))
    });
    let dispatcher = Dispatcher::builder(BincodeCodec, echo, PendingCalls::new())
        .pool(pool.clone())
        .build();

    let stop_reporting = CancellationToken::new();
    let stats: Arc<dyn StatisticCallback> = Arc::new(dispatcher.clone());
    let reporter = tokio::spawn(report_statistics(
        vec![stats],
        Duration::from_secs(cli.stats_interval.max(1)),
        stop_reporting.clone(),
    ));

    let server = DispatchServer::bind(cli.bind, dispatcher).await?;
    info!(
        "listening: addr={}, workers={}, queue_capacity={}",
        server.local_addr()?,
        pool_config.max_workers,
        pool_config.queue_capacity
    );
    server.run().await?;

    stop_reporting.cancel();
    let _ = reporter.await;
    pool.shutdown().await;
    info!("shut down");
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!("serving metrics: addr={addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    log::warn!("metrics support not compiled in, ignoring --metrics-addr {addr}");
    Ok(())
}
