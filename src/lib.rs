#![doc(html_root_url = "https://docs.rs/wiredispatch/latest")]
//! Message-dispatch core for RPC endpoints.
//!
//! `wiredispatch` sits between framed messages arriving on a connection and
//! the business handler that answers them. Each [`WireFrame`] is decoded by
//! a [`Codec`], classified as a request or a response, and executed on a
//! bounded [`WorkerPool`]. When the pool is saturated requests receive an
//! immediate overload reply instead of queueing without bound. Replies are
//! written asynchronously and every request yields exactly one of them.
//!
//! A reference stream transport ([`connection::serve_connection`]) and TCP
//! server ([`server::DispatchServer`]) are included.

pub mod channel;
pub mod client;
pub mod codec;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod pool;
pub mod reply;
pub mod server;

pub use channel::{Channel, WriteCompletion, WriteError};
pub use codec::{BincodeCodec, Codec, CodecError};
pub use context::RequestContext;
pub use dispatch::{Dispatcher, RejectionCounter, StatisticCallback};
pub use error::{DispatchError, Result};
pub use frame::{VersionTag, WireFrame};
pub use handler::{HandlerResult, MessageHandler, ResponseSink};
pub use message::{DecodedMessage, ErrorKind, ErrorPayload, Request, Response};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, REJECTIONS_TOTAL};
pub use pool::{PoolConfig, WorkerPool};
pub use reply::{FinishStatus, Reply, error_reply};
