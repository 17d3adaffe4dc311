//! Frame-to-dispatch request pipeline shared by all connections

use crate::dispatch::{Dispatcher, Responder};
use crate::protocol::inbound::{InboundDecoder, InboundError};
use crate::protocol::outbound::ResponseEncoder;
use crate::transports::ConnectionHandle;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Request lifecycle from frame to dispatched request
///
/// Shared by every connection of a server. [`RequestPipeline::on_frame`]
/// never waits on business logic: accepted requests are handed to the
/// executor and answered later through their [`Responder`].
pub struct RequestPipeline {
    dispatcher: Dispatcher,
    encoder: Arc<ResponseEncoder>,
}

impl RequestPipeline {
    pub fn new(dispatcher: Dispatcher, encoder: ResponseEncoder) -> Self {
        Self {
            dispatcher,
            encoder: Arc::new(encoder),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn encoder(&self) -> &ResponseEncoder {
        &self.encoder
    }

    /// Process one frame read from `connection`
    ///
    /// A rejected request is answered before its error is returned; the
    /// returned error is for the connection's log only.
    pub fn on_frame(
        &self,
        frame: Bytes,
        received_at: Instant,
        decoder: &mut InboundDecoder,
        connection: &ConnectionHandle,
    ) -> Result<(), InboundError> {
        match decoder.decode(&frame, received_at) {
            Ok((context, envelope)) => {
                let responder = Responder::new(context, connection.clone(), self.encoder.clone());
                self.dispatcher.dispatch(envelope, responder);
                Ok(())
            }
            Err(InboundError::Rejected { context, error }) => {
                Responder::new(context, connection.clone(), self.encoder.clone())
                    .fail(error.clone());
                Err(InboundError::Rejected { context, error })
            }
            Err(dropped) => Err(dropped),
        }
    }
}
