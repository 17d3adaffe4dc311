//! Outbound response encoding
//!
//! [`ResponseEncoder::encode`] is the single point every completed request
//! passes through, success or failure. It serialises the envelope and
//! records the request's full lifetime in the stats tracker.

use crate::context::RequestContext;
use crate::protocol::classify::FailureKind;
use crate::protocol::response::ResponseBuilder;
use crate::stats::StatsTracker;
use bytes::Bytes;
use codec::{CodecError, Envelope};
use tracing::warn;

/// Encoded response tagged with its request's receipt sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub sequence: u64,
    pub bytes: Bytes,
}

/// Envelope encoder with the latency side effect
#[derive(Clone)]
pub struct ResponseEncoder {
    tracker: StatsTracker,
}

impl ResponseEncoder {
    pub fn new(tracker: StatsTracker) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &StatsTracker {
        &self.tracker
    }

    /// Encode the response for `context` and record its processing time
    ///
    /// An envelope that breaks a wire limit is replaced by an
    /// `ExecutionFailure` describing the problem. The sample is recorded
    /// even when no bytes could be produced.
    pub fn encode(
        &self,
        context: RequestContext,
        envelope: Envelope,
    ) -> Result<OutboundFrame, CodecError> {
        let encoded = envelope.encode().or_else(|err| {
            warn!(
                request_id = %context.request_id(),
                message_type = envelope.message_type(),
                error = %err,
                "Response exceeds wire limits, sending execution failure instead"
            );
            ResponseBuilder::error_envelope(
                context.request_id(),
                FailureKind::ExecutionFailure,
                format!("response could not be encoded: {err}"),
            )
            .encode()
        });

        self.tracker.record_sample(context.elapsed_ms());

        encoded.map(|bytes| OutboundFrame {
            sequence: context.sequence(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsConfig;
    use codec::{RequestId, WireFormat};
    use std::time::{Duration, Instant};

    fn encoder() -> ResponseEncoder {
        ResponseEncoder::new(StatsTracker::start(&StatsConfig::default(), "test", None))
    }

    #[test]
    fn test_encode_records_one_sample_per_response() {
        let encoder = encoder();
        let id = RequestId::from_parts(5, 6);
        let context = RequestContext::new(id, Instant::now() - Duration::from_millis(40), 3);

        let frame = encoder
            .encode(context, Envelope::ok(id, "demo.Echo", vec![9]))
            .unwrap();

        assert_eq!(frame.sequence, 3);
        assert_eq!(Envelope::decode(&frame.bytes).unwrap().request_id(), id);
        assert_eq!(encoder.tracker().total_requests(), 1);
        assert!(encoder.tracker().query_average_processing_time() >= 40.0);
    }

    #[test]
    fn test_oversize_response_is_replaced_not_lost() {
        let encoder = encoder();
        let id = RequestId::from_parts(7, 8);
        let context = RequestContext::new(id, Instant::now(), 0);
        let huge = vec![0u8; WireFormat::MAX_PAYLOAD_SIZE + 1];

        let frame = encoder
            .encode(context, Envelope::ok(id, "demo.Echo", huge))
            .unwrap();
        let decoded = Envelope::decode(&frame.bytes).unwrap();

        assert_eq!(decoded.request_id(), id);
        assert_eq!(decoded.message_type(), FailureKind::ExecutionFailure.type_name());
        assert_eq!(encoder.tracker().total_requests(), 1);
    }
}
