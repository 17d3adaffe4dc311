//! Per-request correlation record

use codec::RequestId;
use std::time::{Duration, Instant};

/// Correlation record created once per inbound envelope
///
/// Travels with the request through dispatch and execution and is handed to
/// the response encoder, which measures `received_at` to completion.
/// `sequence` is the connection-local receipt order, used when responses must
/// be released in the order requests arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    request_id: RequestId,
    received_at: Instant,
    sequence: u64,
}

impl RequestContext {
    pub fn new(request_id: RequestId, received_at: Instant, sequence: u64) -> Self {
        Self {
            request_id,
            received_at,
            sequence,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since the request was read off the wire
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Whole milliseconds since receipt, saturating
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_counts_from_receipt() {
        let received_at = Instant::now() - Duration::from_millis(25);
        let context = RequestContext::new(RequestId::from_parts(1, 2), received_at, 0);

        assert!(context.elapsed_ms() >= 25);
        assert_eq!(context.request_id(), RequestId::from_parts(1, 2));
    }
}
