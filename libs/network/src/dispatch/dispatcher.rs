use crate::dispatch::executor::Executor;
use crate::dispatch::registry::HandlerRegistry;
use crate::dispatch::responder::Responder;
use crate::error::PipelineError;
use codec::Envelope;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves, deserialises and hands requests to the executor
///
/// Unknown types and malformed payloads are answered straight away without
/// reaching the executor. `dispatch` never waits on business logic.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, executor: Arc<dyn Executor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn dispatch(&self, envelope: Envelope, responder: Responder) {
        let request_id = responder.context().request_id();
        let message_type = envelope.message_type();

        let Some(deserializer) = self.registry.lookup(message_type) else {
            warn!(
                request_id = %request_id,
                message_type,
                "Unknown message type"
            );
            responder.fail(PipelineError::unknown_message_type(message_type));
            return;
        };

        match deserializer.deserialize(envelope.payload()) {
            Ok(message) => {
                debug!(request_id = %request_id, message_type, "Dispatching request");
                self.executor.execute(message, responder);
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    message_type,
                    error = %err,
                    "Malformed payload"
                );
                responder.fail(PipelineError::malformed_payload(message_type, err));
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
