//! # RPC Server Protocol Layer
//!
//! ## Purpose
//!
//! Terminates connections, frames and decodes request envelopes, dispatches
//! each request to business logic without blocking the I/O path, and writes
//! back exactly one response (success or classified error) per request.
//! Rolling latency/throughput statistics are kept on the way out.
//!
//! ## Architecture Role
//!
//! ```text
//! socket → transports (framing) → protocol::InboundDecoder → dispatch::Dispatcher
//!                                         │                        │
//!                                         │ rejected               ▼ Executor (worker pool)
//!                                         ▼                        │
//! socket ← ConnectionHandle ← protocol::ResponseEncoder ← Responder ┘
//!                                   │
//!                                   └→ stats::StatsTracker → ObservabilitySink
//! ```
//!
//! ## Failure Domains
//!
//! - Request-scoped ([`PipelineError`]): protocol violation, unknown message
//!   type, malformed payload, execution failure. Answered with an error
//!   envelope; the connection and other requests are unaffected.
//! - Connection-scoped ([`TransportError`]): logged, only that connection closes.
//!
//! No request timeouts are applied here; callers that need them wrap
//! their executor or client calls.

pub mod client;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod transports;

pub use client::{ClientError, RemoteError, RpcClient};
pub use config::{ExecutorConfig, ListenAddress, ResponseOrdering, ServerConfig, StatsConfig};
pub use context::RequestContext;
pub use dispatch::{
    Deserializer, Dispatcher, Executor, HandlerRegistry, HandlerRouter, RequestHandler,
    Responder, TaskExecutor, WorkerPool,
};
pub use error::{ExecutionError, PayloadError, PipelineError, Result, TransportError};
pub use message::{decode_typed, encode_typed, RpcMessage, TypedMessage};
pub use protocol::{classify, FailureKind, Outcome, ResponseBuilder};
pub use server::RpcServer;
#[cfg(feature = "monitoring")]
pub use stats::MetricsSink;
pub use stats::{ObservabilitySink, StatsRegistry, StatsSnapshot, StatsSource, StatsTracker};
pub use transports::{ConnectionHandle, ConnectionId, ConnectionRegistry};
