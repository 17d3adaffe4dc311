//! Response builder
//!
//! Turns an [`Outcome`] into the envelope written back for one request. The
//! request id is always copied from the [`RequestContext`]; nothing else about
//! the inbound envelope leaks into the response.

use crate::context::RequestContext;
use crate::error::{ExecutionError, PipelineError};
use crate::protocol::classify::{classify, FailureKind};
use crate::protocol::outcome::Outcome;
use codec::{Envelope, RequestId, WireFormat};
use tracing::warn;

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Build the response envelope for `outcome`
    pub fn build(context: &RequestContext, outcome: Outcome) -> Envelope {
        let request_id = context.request_id();

        match outcome {
            Outcome::Success(message) => match message.encode_payload() {
                Ok(payload) => Envelope::ok(request_id, message.message_type(), payload),
                Err(err) => {
                    warn!(
                        request_id = %request_id,
                        message_type = message.message_type(),
                        error = %err,
                        "Response payload could not be encoded"
                    );
                    Self::failure(
                        request_id,
                        &ExecutionError::new(format!(
                            "response '{}' could not be encoded: {err}",
                            message.message_type()
                        ))
                        .into(),
                    )
                }
            },
            Outcome::Failure(error) => Self::failure(request_id, &error),
        }
    }

    /// Error envelope for a classified failure
    pub fn failure(request_id: RequestId, error: &PipelineError) -> Envelope {
        let classification = classify(error);
        Self::error_envelope(request_id, classification.kind, classification.message)
    }

    pub(crate) fn error_envelope(
        request_id: RequestId,
        kind: FailureKind,
        message: String,
    ) -> Envelope {
        Envelope::error(request_id, kind.type_name(), truncate(message))
    }
}

/// Cut a description down to the wire limit on a char boundary
fn truncate(mut message: String) -> String {
    let limit = WireFormat::MAX_ERROR_MESSAGE_LENGTH;
    if message.len() > limit {
        let mut end = limit;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadError;
    use crate::message::{RpcMessage, TypedMessage};
    use bytes::Bytes;
    use codec::Status;
    use serde::{Deserialize, Serialize};
    use std::any::Any;
    use std::time::Instant;

    #[derive(Debug, Serialize, Deserialize)]
    struct Reply {
        text: String,
    }

    impl TypedMessage for Reply {
        const MESSAGE_TYPE: &'static str = "test.Reply";
    }

    #[derive(Debug)]
    struct Unencodable;

    impl RpcMessage for Unencodable {
        fn message_type(&self) -> &str {
            "test.Unencodable"
        }

        fn encode_payload(&self) -> Result<Bytes, PayloadError> {
            Err(PayloadError::Encode("refused".into()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
            self
        }
    }

    fn context() -> RequestContext {
        RequestContext::new(RequestId::from_parts(42, 43), Instant::now(), 0)
    }

    #[test]
    fn test_success_copies_request_id_and_type() {
        let envelope = ResponseBuilder::build(
            &context(),
            Outcome::success(Reply {
                text: "hi".into(),
            }),
        );

        assert_eq!(envelope.request_id(), RequestId::from_parts(42, 43));
        assert_eq!(envelope.status(), Status::Ok);
        assert_eq!(envelope.message_type(), "test.Reply");
        assert_eq!(envelope.error_message(), None);

        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded.request_id(), RequestId::from_parts(42, 43));
    }

    #[test]
    fn test_failure_is_classified_by_type_name() {
        let envelope = ResponseBuilder::build(
            &context(),
            Outcome::failure(PipelineError::unknown_message_type("demo.Missing")),
        );

        assert!(envelope.is_error());
        assert_eq!(envelope.message_type(), "rpc.error.UnknownMessageType");
        assert!(envelope.payload().is_empty());
        assert!(envelope.error_message().unwrap().contains("demo.Missing"));
    }

    #[test]
    fn test_unencodable_success_becomes_execution_failure() {
        let envelope = ResponseBuilder::build(&context(), Outcome::success(Unencodable));

        assert_eq!(envelope.message_type(), "rpc.error.ExecutionFailure");
        assert!(envelope.error_message().unwrap().contains("refused"));
    }

    #[test]
    fn test_long_error_text_is_truncated_to_fit() {
        let long = "é".repeat(WireFormat::MAX_ERROR_MESSAGE_LENGTH);
        let envelope = ResponseBuilder::build(&context(), Outcome::failure(ExecutionError::new(long)));

        assert!(envelope.error_message().unwrap().len() <= WireFormat::MAX_ERROR_MESSAGE_LENGTH);
        assert!(envelope.encode().is_ok());
    }
}
