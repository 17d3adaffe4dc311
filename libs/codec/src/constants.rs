//! Wire format constants
//!
//! These values define the envelope layout and must stay stable across
//! client and server releases.

/// Wire format constants
pub struct WireFormat;

impl WireFormat {
    /// Magic bytes opening every envelope
    pub const MAGIC: &'static [u8; 4] = b"RPCE";
    /// Envelope layout version
    pub const VERSION: u8 = 1;
    /// magic(4) + version(1) + status(1) + reserved(2) + msb(8) + lsb(8)
    pub const HEADER_SIZE: usize = 24;
    /// Trailing CRC-32
    pub const CHECKSUM_SIZE: usize = 4;
    /// Smallest well-formed envelope: header, empty type name, empty payload, checksum
    pub const MIN_ENVELOPE_SIZE: usize = Self::HEADER_SIZE + 2 + 4 + Self::CHECKSUM_SIZE;
    /// Longest message type name (u16 length prefix)
    pub const MAX_TYPE_NAME_LENGTH: usize = u16::MAX as usize;
    /// Largest payload carried by a single envelope (16MB)
    pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;
    /// Longest error description (64KB)
    pub const MAX_ERROR_MESSAGE_LENGTH: usize = 64 * 1024;
}
