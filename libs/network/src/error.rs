//! Pipeline Error Types
//!
//! Two independent failure domains flow through the server:
//!
//! - [`TransportError`]: connection-scoped I/O and framing failures. Logged,
//!   the affected connection is closed, nothing else is touched.
//! - [`PipelineError`]: request-scoped failures. Always recovered by writing
//!   a structured error envelope back for the one request that caused it.

use codec::CodecError;
use thiserror::Error;

/// Connection-level transport error
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connect, bind or runtime setup failed
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Length prefix announces a frame beyond the configured limit
    #[error("Frame too large: {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Rejected server configuration; `field` names the offending key
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Resource exhausted: {resource}: {message}")]
    ResourceExhausted { resource: String, message: String },

    /// The connection is closed; no further writes are valid
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// True when the peer simply went away
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::ConnectionClosed => true,
            TransportError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Label for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::FrameTooLarge { .. } => "frame_too_large",
            TransportError::Codec(_) => "codec",
            TransportError::Configuration { .. } => "configuration",
            TransportError::ResourceExhausted { .. } => "resource_exhausted",
            TransportError::ConnectionClosed => "connection_closed",
            TransportError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Failure to (de)serialise an application message payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Business logic failure reported by a request handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Request-scoped failure, recovered into an error envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Inbound envelope broke the protocol (ERROR status, undecodable fields)
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// No deserializer registered for the message type name
    #[error("Unknown message type: {message_type}")]
    UnknownMessageType { message_type: String },

    /// Registered type, but the payload did not deserialize
    #[error("Malformed payload for {message_type}: {source}")]
    MalformedPayload {
        message_type: String,
        #[source]
        source: PayloadError,
    },

    /// Business logic raised an error
    #[error("Execution failure: {0}")]
    Execution(#[from] ExecutionError),
}

impl PipelineError {
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    pub fn unknown_message_type(message_type: impl Into<String>) -> Self {
        Self::UnknownMessageType {
            message_type: message_type.into(),
        }
    }

    pub fn malformed_payload(message_type: impl Into<String>, source: PayloadError) -> Self {
        Self::MalformedPayload {
            message_type: message_type.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_categorization() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            TransportError::network_with_source("connect", refused).category(),
            "network"
        );
        assert_eq!(
            TransportError::FrameTooLarge { len: 10, max: 5 }.category(),
            "frame_too_large"
        );
        assert_eq!(
            TransportError::resource_exhausted("connections", "limit 1 reached").category(),
            "resource_exhausted"
        );
    }

    #[test]
    fn test_network_error_keeps_its_source() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::network_with_source("Failed to connect", refused);

        assert_eq!(err.to_string(), "Network error: Failed to connect");
        assert_eq!(err.source().map(|source| source.to_string()).as_deref(), Some("refused"));
    }

    #[test]
    fn test_configuration_error_names_field() {
        match TransportError::configuration("must be non-zero", Some("max_frame_size")) {
            TransportError::Configuration { field, .. } => {
                assert_eq!(field.as_deref(), Some("max_frame_size"));
            }
            other => panic!("Expected Configuration error, got {other:?}"),
        }
    }
    #[test]
    fn test_disconnects_are_recognised() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(TransportError::from(eof).is_disconnect());
        assert!(TransportError::ConnectionClosed.is_disconnect());
        assert!(!TransportError::FrameTooLarge { len: 10, max: 5 }.is_disconnect());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let transport_err = TransportError::from(io_err);

        match transport_err {
            TransportError::Io { message, .. } => {
                assert!(message.contains("test"));
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::malformed_payload(
            "demo.Add",
            PayloadError::Decode("unexpected end of file".into()),
        );
        assert_eq!(
            err.to_string(),
            "Malformed payload for demo.Add: failed to decode payload: unexpected end of file"
        );
        assert_eq!(
            PipelineError::from(ExecutionError::new("boom")).to_string(),
            "Execution failure: boom"
        );
    }
}
