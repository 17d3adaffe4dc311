//! Request/Response Protocol
//!
//! Everything between a decoded frame and an encoded response:
//!
//! ```text
//! frame → InboundDecoder → (RequestContext, Envelope) → Dispatcher
//!                ↓ rejected                                 ↓
//!          ResponseBuilder ←──────────── Outcome ←── Executor / Responder
//!                ↓
//!          ResponseEncoder (records latency) → OutboundFrame → connection
//! ```

pub mod classify;
pub mod inbound;
pub mod outbound;
pub mod outcome;
pub mod pipeline;
pub mod response;

pub use classify::{classify, Classification, FailureKind};
pub use inbound::{InboundDecoder, InboundError};
pub use outbound::{OutboundFrame, ResponseEncoder};
pub use outcome::Outcome;
pub use pipeline::RequestPipeline;
pub use response::ResponseBuilder;
