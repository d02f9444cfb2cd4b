//! Command line interface for the `wiredispatch` demo server.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `wiredispatch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "wiredispatch",
    version,
    about = "Echo RPC server built on the wiredispatch core"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    pub bind: SocketAddr,

    /// Worker tasks executing requests. Defaults to the available
    /// parallelism.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Requests that may wait for a free worker before new ones are
    /// rejected as overloaded.
    #[arg(short, long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Seconds between statistics log lines.
    #[arg(long, default_value_t = 30)]
    pub stats_interval: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
