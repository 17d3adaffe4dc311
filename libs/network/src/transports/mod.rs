//! Stream transports
//!
//! Framing, per-connection reader/writer tasks, and the registry of open
//! connections. TCP and Unix domain sockets share all of it; only accept
//! differs (see [`crate::server`]).

pub mod connection;
pub mod framing;
pub mod registry;
pub mod sequencer;

pub use connection::{ConnectionHandle, ConnectionId};
pub use framing::{FrameReader, FrameWriter, LENGTH_PREFIX_SIZE};
pub use registry::ConnectionRegistry;
pub use sequencer::ResponseSequencer;
