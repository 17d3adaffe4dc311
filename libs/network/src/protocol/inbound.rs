//! Inbound envelope decoding
//!
//! One [`InboundDecoder`] lives on each connection. It turns a frame into a
//! [`RequestContext`] plus [`Envelope`], assigns the connection-local receipt
//! sequence, and sorts decode failures into the two cases the connection
//! treats differently:
//!
//! - [`InboundError::Rejected`]: the request id is known, so the client gets
//!   an `InvalidMessage` error response
//! - [`InboundError::Dropped`]: the id cannot be trusted, so the frame is
//!   logged and discarded without a response

use crate::context::RequestContext;
use crate::error::PipelineError;
use bytes::Bytes;
use codec::{CodecError, Envelope, RequestId};
use std::time::Instant;
use thiserror::Error;

/// Why an inbound frame did not become a dispatchable request
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("request {} rejected: {error}", .context.request_id())]
    Rejected {
        context: RequestContext,
        error: PipelineError,
    },

    #[error("undecodable frame dropped: {0}")]
    Dropped(#[source] CodecError),
}

/// Per-connection decoder state
#[derive(Debug, Default)]
pub struct InboundDecoder {
    next_sequence: u64,
}

impl InboundDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame received at `received_at`
    pub fn decode(
        &mut self,
        frame: &Bytes,
        received_at: Instant,
    ) -> Result<(RequestContext, Envelope), InboundError> {
        match Envelope::decode(frame) {
            Ok(envelope) => {
                let context = self.context(envelope.request_id(), received_at);
                if envelope.is_error() {
                    return Err(InboundError::Rejected {
                        context,
                        error: PipelineError::protocol_violation(format!(
                            "request '{}' arrived with ERROR status",
                            envelope.message_type()
                        )),
                    });
                }
                Ok((context, envelope))
            }
            Err(err) => match err.request_id() {
                Some(request_id) => Err(InboundError::Rejected {
                    context: self.context(request_id, received_at),
                    error: PipelineError::protocol_violation(format!(
                        "malformed envelope: {err}"
                    )),
                }),
                None => Err(InboundError::Dropped(err)),
            },
        }
    }

    /// Number of requests that have been assigned a sequence
    pub fn accepted(&self) -> u64 {
        self.next_sequence
    }

    fn context(&mut self, request_id: RequestId, received_at: Instant) -> RequestContext {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        RequestContext::new(request_id, received_at, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn id() -> RequestId {
        RequestId::from_parts(0xaa, 0xbb)
    }

    #[test]
    fn test_ok_request_gets_context_and_sequence() {
        let mut decoder = InboundDecoder::new();
        let frame = Envelope::ok(id(), "demo.Echo", vec![1, 2, 3]).encode().unwrap();

        let (first, envelope) = decoder.decode(&frame, Instant::now()).unwrap();
        let (second, _) = decoder.decode(&frame, Instant::now()).unwrap();

        assert_eq!(first.request_id(), id());
        assert_eq!(envelope.message_type(), "demo.Echo");
        assert_eq!((first.sequence(), second.sequence()), (0, 1));
    }

    #[test]
    fn test_error_status_request_is_rejected_with_its_id() {
        let mut decoder = InboundDecoder::new();
        let frame = Envelope::error(id(), "demo.Echo", "client-side failure")
            .encode()
            .unwrap();

        match decoder.decode(&frame, Instant::now()) {
            Err(InboundError::Rejected { context, error }) => {
                assert_eq!(context.request_id(), id());
                assert!(matches!(error, PipelineError::ProtocolViolation { .. }));
            }
            other => panic!("Expected rejection, got {other:?}"),
        }
        assert_eq!(decoder.accepted(), 1);
    }

    #[test]
    fn test_untrusted_frames_are_dropped_without_sequence() {
        let mut decoder = InboundDecoder::new();
        let mut corrupted = BytesMut::from(
            &Envelope::ok(id(), "demo.Echo", vec![1, 2, 3])
                .encode()
                .unwrap()[..],
        );
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        for frame in [Bytes::from_static(b"short"), corrupted.freeze()] {
            assert!(matches!(
                decoder.decode(&frame, Instant::now()),
                Err(InboundError::Dropped(_))
            ));
        }
        assert_eq!(decoder.accepted(), 0);
    }
}
