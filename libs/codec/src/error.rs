//! Codec errors for envelope encoding and decoding
//!
//! Every decode failure records whether the request id had already been
//! recovered. Callers use [`CodecError::request_id`] to decide between
//! answering with a protocol error response and dropping the bytes.

use crate::RequestId;
use thiserror::Error;

/// Envelope encoding/decoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer ends before a field it declares
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: &'static str,
        request_id: Option<RequestId>,
    },

    /// Magic bytes did not match - not an envelope at all
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Envelope layout version is not understood by this codec
    #[error("Unsupported envelope version {version}: supported version is {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// CRC-32 over the envelope does not match its trailer
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x} (message: {message_size} bytes)")]
    ChecksumMismatch {
        expected: u32,
        calculated: u32,
        message_size: usize,
        /// Id as read from the header; not trustworthy after a checksum failure
        claimed_request_id: RequestId,
    },

    /// Status byte is neither OK nor ERROR
    #[error("Unknown status byte {status:#04x}")]
    UnknownStatus { status: u8, request_id: RequestId },

    /// A string field is not valid UTF-8
    #[error("Invalid UTF-8 in {field}: {reason}")]
    InvalidUtf8 {
        field: &'static str,
        reason: String,
        request_id: Option<RequestId>,
    },

    /// A field exceeds its wire limit
    #[error("{field} too large: {size} bytes exceeds limit {limit}")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
        request_id: Option<RequestId>,
    },

    /// Bytes remain between the last field and the checksum
    #[error("Trailing bytes: {count} unread bytes before checksum")]
    TrailingBytes { count: usize, request_id: RequestId },

    /// Envelope fields contradict each other
    #[error("Invalid envelope: {reason}")]
    InvalidEnvelope {
        reason: String,
        request_id: Option<RequestId>,
    },
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

impl CodecError {
    /// Request id recovered before the failure, if it can be trusted
    ///
    /// `None` means no response can be correlated with the offending bytes.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Truncated { request_id, .. }
            | Self::InvalidUtf8 { request_id, .. }
            | Self::FieldTooLarge { request_id, .. }
            | Self::InvalidEnvelope { request_id, .. } => *request_id,
            Self::UnknownStatus { request_id, .. } | Self::TrailingBytes { request_id, .. } => {
                Some(*request_id)
            }
            Self::InvalidMagic { .. }
            | Self::UnsupportedVersion { .. }
            | Self::ChecksumMismatch { .. } => None,
        }
    }

    /// Stable short name for logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Truncated { .. } => "truncated",
            Self::InvalidMagic { .. } => "invalid_magic",
            Self::UnsupportedVersion { .. } => "unsupported_version",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::UnknownStatus { .. } => "unknown_status",
            Self::InvalidUtf8 { .. } => "invalid_utf8",
            Self::FieldTooLarge { .. } => "field_too_large",
            Self::TrailingBytes { .. } => "trailing_bytes",
            Self::InvalidEnvelope { .. } => "invalid_envelope",
        }
    }

    pub(crate) fn truncated(
        need: usize,
        got: usize,
        context: &'static str,
        request_id: Option<RequestId>,
    ) -> Self {
        Self::Truncated {
            need,
            got,
            context,
            request_id,
        }
    }

    pub(crate) fn field_too_large(
        field: &'static str,
        size: usize,
        limit: usize,
        request_id: Option<RequestId>,
    ) -> Self {
        Self::FieldTooLarge {
            field,
            size,
            limit,
            request_id,
        }
    }
}
