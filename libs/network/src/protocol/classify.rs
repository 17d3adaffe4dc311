//! Error classification
//!
//! Maps request-scoped failures to the stable `(type name, message)` pair
//! written into error envelopes. Clients match on the type name; the
//! message is free text for humans.

use crate::error::PipelineError;
use std::fmt;

/// Wire-visible failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Inbound envelope was itself marked ERROR or could not be parsed
    ProtocolViolation,
    UnknownMessageType,
    MalformedPayload,
    /// Business logic failed, panicked or never answered
    ExecutionFailure,
}

impl FailureKind {
    pub const ALL: [FailureKind; 4] = [
        FailureKind::ProtocolViolation,
        FailureKind::UnknownMessageType,
        FailureKind::MalformedPayload,
        FailureKind::ExecutionFailure,
    ];

    /// Message type name carried by error envelopes of this kind
    pub const fn type_name(self) -> &'static str {
        match self {
            FailureKind::ProtocolViolation => "rpc.error.InvalidMessage",
            FailureKind::UnknownMessageType => "rpc.error.UnknownMessageType",
            FailureKind::MalformedPayload => "rpc.error.MalformedPayload",
            FailureKind::ExecutionFailure => "rpc.error.ExecutionFailure",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_name() == name)
    }

    /// Short label for logs and metrics
    pub const fn label(self) -> &'static str {
        match self {
            FailureKind::ProtocolViolation => "protocol_violation",
            FailureKind::UnknownMessageType => "unknown_message_type",
            FailureKind::MalformedPayload => "malformed_payload",
            FailureKind::ExecutionFailure => "execution_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    /// Human-readable description, possibly empty
    pub message: String,
}

/// Classify a request-scoped failure
pub fn classify(error: &PipelineError) -> Classification {
    match error {
        PipelineError::ProtocolViolation { reason } => Classification {
            kind: FailureKind::ProtocolViolation,
            message: reason.clone(),
        },
        PipelineError::UnknownMessageType { message_type } => Classification {
            kind: FailureKind::UnknownMessageType,
            message: format!("no handler registered for message type '{message_type}'"),
        },
        PipelineError::MalformedPayload {
            message_type,
            source,
        } => Classification {
            kind: FailureKind::MalformedPayload,
            message: format!("payload is not a valid '{message_type}': {source}"),
        },
        PipelineError::Execution(err) => Classification {
            kind: FailureKind::ExecutionFailure,
            message: err.message().to_string(),
        },
    }
}
