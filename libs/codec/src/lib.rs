//! # RPC Envelope Codec
//!
//! ## Purpose
//!
//! This crate contains the wire-level "rules" of the RPC transport:
//! - The [`Envelope`] structure exchanged between client and server
//! - 128-bit [`RequestId`] correlation identifiers
//! - Deterministic binary encoding and checksummed decoding
//! - Codec errors that report whether the request id was recovered
//!
//! ## Architecture Role
//!
//! ```text
//! wire bytes → [codec] → network/ (dispatch, executor hand-off, responses)
//!     ↑           ↓              ↓
//! Framed     Envelope       Request lifecycle
//! streams    RequestId      Stats, connections
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Stream framing or socket handling (belongs in `network`)
//! - Message type resolution or payload deserialisation (belongs in `network`)
//! - Any notion of which side of the connection is decoding
//!
//! ## Wire Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! magic "RPCE" | version u8 | status u8 | reserved u16
//! request_id_msb u64 | request_id_lsb u64
//! type_name_len u16 | type_name utf8
//! payload_len u32   | payload bytes
//! [status == ERROR] error_len u32 | error utf8
//! crc32 u32 (over everything above)
//! ```
//!
//! The request id sits inside the fixed header so that every failure past
//! the header can still be correlated with the request that caused it.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod request_id;

pub use constants::WireFormat;
pub use envelope::{Envelope, Status};
pub use error::{CodecError, CodecResult};
pub use request_id::RequestId;
