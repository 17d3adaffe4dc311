//! RPC Envelope
//!
//! The envelope is the sole unit exchanged at the wire boundary. It carries
//! the request id, a status, the fully-qualified message type name, the
//! serialised payload and, for error responses only, a textual description.
//!
//! ## Invariants
//!
//! - `error_message` is `Some` if and only if `status == Status::Error`
//!   (an error may carry an empty description)
//! - Envelopes are immutable once constructed; builders consume `self`
//!
//! ## Decode Order
//!
//! The fixed header (including the request id) is read first, then the
//! checksum is verified, then the variable-length fields. A failure after the
//! checksum has been verified still reports the request id, so the server can
//! answer the offending request instead of silently dropping it.

use crate::{CodecError, CodecResult, RequestId, WireFormat};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    /// Wire representation
    pub fn to_byte(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }

    /// Parse the wire representation
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            _ => None,
        }
    }
}

/// Wire-level request/response envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    request_id: RequestId,
    status: Status,
    message_type: String,
    payload: Bytes,
    error_message: Option<String>,
}

impl Envelope {
    /// Create an OK envelope carrying a serialised message
    pub fn ok(
        request_id: RequestId,
        message_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            request_id,
            status: Status::Ok,
            message_type: message_type.into(),
            payload: payload.into(),
            error_message: None,
        }
    }

    /// Create an ERROR envelope with an empty payload
    ///
    /// `message_type` names the failure classification; `error_message` may be
    /// empty when the cause has no description.
    pub fn error(
        request_id: RequestId,
        message_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            status: Status::Error,
            message_type: message_type.into(),
            payload: Bytes::new(),
            error_message: Some(error_message.into()),
        }
    }

    /// Replace the payload, keeping every other field
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Fully-qualified message type name (or failure classification)
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Error description; `None` for OK envelopes
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Consume the envelope, keeping only the payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Exact number of bytes [`Envelope::encode`] produces
    pub fn encoded_len(&self) -> usize {
        WireFormat::HEADER_SIZE
            + 2
            + self.message_type.len()
            + 4
            + self.payload.len()
            + self
                .error_message
                .as_ref()
                .map_or(0, |message| 4 + message.len())
            + WireFormat::CHECKSUM_SIZE
    }

    /// Serialise to wire format
    ///
    /// Encoding is deterministic: equal envelopes produce identical bytes.
    pub fn encode(&self) -> CodecResult<Bytes> {
        self.check_limits()?;

        let mut buffer = BytesMut::with_capacity(self.encoded_len());

        // Fixed header (24 bytes)
        buffer.put_slice(WireFormat::MAGIC);
        buffer.put_u8(WireFormat::VERSION);
        buffer.put_u8(self.status.to_byte());
        buffer.put_u16_le(0); // reserved
        buffer.put_u64_le(self.request_id.msb());
        buffer.put_u64_le(self.request_id.lsb());

        // Variable-length fields
        buffer.put_u16_le(self.message_type.len() as u16);
        buffer.put_slice(self.message_type.as_bytes());
        buffer.put_u32_le(self.payload.len() as u32);
        buffer.put_slice(&self.payload);
        if let Some(message) = &self.error_message {
            buffer.put_u32_le(message.len() as u32);
            buffer.put_slice(message.as_bytes());
        }

        let checksum = crc32fast::hash(&buffer);
        buffer.put_u32_le(checksum);

        Ok(buffer.freeze())
    }

    /// Deserialise from wire format without copying the payload
    pub fn decode(data: &Bytes) -> CodecResult<Self> {
        if data.len() < WireFormat::HEADER_SIZE {
            return Err(CodecError::truncated(
                WireFormat::HEADER_SIZE,
                data.len(),
                "header",
                None,
            ));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != *WireFormat::MAGIC {
            return Err(CodecError::InvalidMagic {
                expected: *WireFormat::MAGIC,
                actual: magic,
            });
        }

        let version = data[4];
        if version != WireFormat::VERSION {
            return Err(CodecError::UnsupportedVersion {
                version,
                supported: WireFormat::VERSION,
            });
        }

        let request_id = RequestId::from_parts(
            LittleEndian::read_u64(&data[8..16]),
            LittleEndian::read_u64(&data[16..24]),
        );

        // Without a verifiable checksum the header bytes cannot be trusted
        if data.len() < WireFormat::MIN_ENVELOPE_SIZE {
            return Err(CodecError::truncated(
                WireFormat::MIN_ENVELOPE_SIZE,
                data.len(),
                "envelope",
                None,
            ));
        }

        let checksum_pos = data.len() - WireFormat::CHECKSUM_SIZE;
        let expected = LittleEndian::read_u32(&data[checksum_pos..]);
        let calculated = crc32fast::hash(&data[..checksum_pos]);
        if expected != calculated {
            return Err(CodecError::ChecksumMismatch {
                expected,
                calculated,
                message_size: data.len(),
                claimed_request_id: request_id,
            });
        }

        let status = Status::from_byte(data[5]).ok_or(CodecError::UnknownStatus {
            status: data[5],
            request_id,
        })?;

        let mut reader = FieldReader {
            data: data.slice(WireFormat::HEADER_SIZE..checksum_pos),
            pos: 0,
            request_id,
        };

        let type_len = reader.read_u16("message type length")? as usize;
        let message_type = reader.read_string(type_len, "message type")?;

        let payload_len = reader.read_u32("payload length")? as usize;
        if payload_len > WireFormat::MAX_PAYLOAD_SIZE {
            return Err(CodecError::field_too_large(
                "payload",
                payload_len,
                WireFormat::MAX_PAYLOAD_SIZE,
                Some(request_id),
            ));
        }
        let payload = reader.take(payload_len, "payload")?;

        let error_message = match status {
            Status::Ok => None,
            Status::Error => {
                let error_len = reader.read_u32("error message length")? as usize;
                if error_len > WireFormat::MAX_ERROR_MESSAGE_LENGTH {
                    return Err(CodecError::field_too_large(
                        "error message",
                        error_len,
                        WireFormat::MAX_ERROR_MESSAGE_LENGTH,
                        Some(request_id),
                    ));
                }
                Some(reader.read_string(error_len, "error message")?)
            }
        };

        if reader.remaining() > 0 {
            return Err(CodecError::TrailingBytes {
                count: reader.remaining(),
                request_id,
            });
        }

        Ok(Self {
            request_id,
            status,
            message_type,
            payload,
            error_message,
        })
    }

    /// Deserialise from a borrowed buffer (copies once)
    pub fn from_bytes(data: &[u8]) -> CodecResult<Self> {
        Self::decode(&Bytes::copy_from_slice(data))
    }

    fn check_limits(&self) -> CodecResult<()> {
        let request_id = Some(self.request_id);
        if self.message_type.len() > WireFormat::MAX_TYPE_NAME_LENGTH {
            return Err(CodecError::field_too_large(
                "message type",
                self.message_type.len(),
                WireFormat::MAX_TYPE_NAME_LENGTH,
                request_id,
            ));
        }
        if self.payload.len() > WireFormat::MAX_PAYLOAD_SIZE {
            return Err(CodecError::field_too_large(
                "payload",
                self.payload.len(),
                WireFormat::MAX_PAYLOAD_SIZE,
                request_id,
            ));
        }
        if let Some(message) = &self.error_message {
            if message.len() > WireFormat::MAX_ERROR_MESSAGE_LENGTH {
                return Err(CodecError::field_too_large(
                    "error message",
                    message.len(),
                    WireFormat::MAX_ERROR_MESSAGE_LENGTH,
                    request_id,
                ));
            }
        }
        if (self.status == Status::Error) != self.error_message.is_some() {
            return Err(CodecError::InvalidEnvelope {
                reason: "error message must be present exactly when status is ERROR".to_string(),
                request_id,
            });
        }
        Ok(())
    }
}

/// Sequential reader over the checksummed body of an envelope
struct FieldReader {
    data: Bytes,
    pos: usize,
    request_id: RequestId,
}

impl FieldReader {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize, context: &'static str) -> CodecResult<Bytes> {
        if self.remaining() < len {
            return Err(CodecError::truncated(
                len,
                self.remaining(),
                context,
                Some(self.request_id),
            ));
        }
        let field = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(field)
    }

    fn read_u16(&mut self, context: &'static str) -> CodecResult<u16> {
        Ok(LittleEndian::read_u16(&self.take(2, context)?))
    }

    fn read_u32(&mut self, context: &'static str) -> CodecResult<u32> {
        Ok(LittleEndian::read_u32(&self.take(4, context)?))
    }

    fn read_string(&mut self, len: usize, field: &'static str) -> CodecResult<String> {
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::InvalidUtf8 {
            field,
            reason: e.to_string(),
            request_id: Some(self.request_id),
        })
    }
}
