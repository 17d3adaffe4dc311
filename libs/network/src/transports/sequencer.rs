use bytes::Bytes;
use std::collections::BTreeMap;

/// Releases responses in request-receipt order
///
/// Completions arrive tagged with their request's sequence number. A
/// completion is held until every lower sequence has been released or
/// skipped.
#[derive(Debug, Default)]
pub struct ResponseSequencer {
    next: u64,
    pending: BTreeMap<u64, Option<Bytes>>,
}

impl ResponseSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the completion for `sequence` (`None` releases nothing but
    /// unblocks later sequences) and return everything now writable, in order
    pub fn complete(&mut self, sequence: u64, frame: Option<Bytes>) -> Vec<Bytes> {
        if sequence < self.next {
            return Vec::new();
        }
        self.pending.insert(sequence, frame);

        let mut ready = Vec::new();
        while let Some(frame) = self.pending.remove(&self.next) {
            ready.extend(frame);
            self.next += 1;
        }
        ready
    }

    /// Completions held back by a missing earlier one
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(tag: &'static str) -> Option<Bytes> {
        Some(Bytes::from_static(tag.as_bytes()))
    }

    #[test]
    fn test_in_order_completions_pass_straight_through() {
        let mut sequencer = ResponseSequencer::new();
        assert_eq!(sequencer.complete(0, frame("a")), vec![Bytes::from_static(b"a")]);
        assert_eq!(sequencer.complete(1, frame("b")), vec![Bytes::from_static(b"b")]);
        assert_eq!(sequencer.buffered(), 0);
    }

    #[test]
    fn test_early_completion_waits_for_predecessor() {
        let mut sequencer = ResponseSequencer::new();
        assert!(sequencer.complete(1, frame("b")).is_empty());
        assert!(sequencer.complete(2, frame("c")).is_empty());
        assert_eq!(sequencer.buffered(), 2);

        let released = sequencer.complete(0, frame("a"));
        assert_eq!(
            released,
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c")
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_any_completion_order_releases_in_receipt_order(
            order in Just((0u64..32).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut sequencer = ResponseSequencer::new();
            let mut released = Vec::new();
            for sequence in order {
                let frame = Bytes::from(sequence.to_le_bytes().to_vec());
                released.extend(sequencer.complete(sequence, Some(frame)));
            }

            let expected: Vec<Bytes> = (0u64..32)
                .map(|sequence| Bytes::from(sequence.to_le_bytes().to_vec()))
                .collect();
            prop_assert_eq!(released, expected);
            prop_assert_eq!(sequencer.buffered(), 0);
        }
    }

    #[test]
    fn test_skipped_sequence_unblocks_successors() {
        let mut sequencer = ResponseSequencer::new();
        assert!(sequencer.complete(1, frame("b")).is_empty());
        assert_eq!(sequencer.complete(0, None), vec![Bytes::from_static(b"b")]);
        assert!(sequencer.complete(0, frame("late")).is_empty());
    }
}
