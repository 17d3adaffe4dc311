//! 128-bit request correlation identifier
//!
//! Carried on the wire as two 64-bit halves (`msb`, `lsb`). The layout
//! matches a UUID, so ids render and parse in the familiar hyphenated form.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier correlating a request with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId {
    msb: u64,
    lsb: u64,
}

impl RequestId {
    /// Build from the two wire halves
    pub const fn from_parts(msb: u64, lsb: u64) -> Self {
        Self { msb, lsb }
    }

    /// Generate a random (v4) request id
    pub fn random() -> Self {
        Self::from(Uuid::new_v4())
    }

    /// Most significant 64 bits
    pub const fn msb(&self) -> u64 {
        self.msb
    }

    /// Least significant 64 bits
    pub const fn lsb(&self) -> u64 {
        self.lsb
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_u64_pair(self.msb, self.lsb)
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        let (msb, lsb) = id.as_u64_pair();
        Self { msb, lsb }
    }
}

impl From<RequestId> for Uuid {
    fn from(id: RequestId) -> Self {
        id.as_uuid()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid().hyphenated())
    }
}
