//! Completion callback handed to the executor
//!
//! A [`Responder`] is consumed by value, so a request can be answered at most
//! once. Dropping it unanswered completes the request with an
//! `ExecutionFailure`, so an executor cannot lose a request silently.

use crate::context::RequestContext;
use crate::error::{ExecutionError, PipelineError};
use crate::message::RpcMessage;
use crate::protocol::{OutboundFrame, Outcome, ResponseBuilder, ResponseEncoder};
use crate::transports::ConnectionHandle;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) const DROPPED_MESSAGE: &str = "request dropped without a response";

/// Answers exactly one request
pub struct Responder {
    context: RequestContext,
    sink: Option<ResponseSink>,
}

struct ResponseSink {
    connection: ConnectionHandle,
    encoder: Arc<ResponseEncoder>,
}

impl Responder {
    pub fn new(
        context: RequestContext,
        connection: ConnectionHandle,
        encoder: Arc<ResponseEncoder>,
    ) -> Self {
        Self {
            context,
            sink: Some(ResponseSink {
                connection,
                encoder,
            }),
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Build, encode and write the response for `outcome`
    pub fn respond(mut self, outcome: Outcome) {
        if let Some(sink) = self.sink.take() {
            sink.complete(self.context, outcome);
        }
    }

    pub fn succeed(self, message: impl RpcMessage) {
        self.respond(Outcome::success(message));
    }

    pub fn fail(self, error: impl Into<PipelineError>) {
        self.respond(Outcome::failure(error));
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!(
                request_id = %self.context.request_id(),
                "Request dropped without a response"
            );
            sink.complete(
                self.context,
                Outcome::failure(ExecutionError::new(DROPPED_MESSAGE)),
            );
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("context", &self.context)
            .field("answered", &self.sink.is_none())
            .finish()
    }
}

impl ResponseSink {
    fn complete(self, context: RequestContext, outcome: Outcome) {
        let request_id = context.request_id();
        let envelope = ResponseBuilder::build(&context, outcome);

        match self.encoder.encode(context, envelope) {
            Ok(frame) => self.write(frame),
            Err(err) => {
                error!(request_id = %request_id, error = %err, "Failed to encode response");
                self.connection.skip_response(context.sequence());
            }
        }
    }

    fn write(&self, frame: OutboundFrame) {
        if let Err(err) = self.connection.send_response(frame) {
            debug!(
                connection = %self.connection.id(),
                error = %err,
                "Response discarded, connection already closed"
            );
        }
    }
}
