//! Property tests for the envelope codec
//!
//! - Every field of a valid envelope survives encode/decode
//! - Arbitrary bytes never panic the decoder
//! - Any single-byte corruption is detected

use codec::{Envelope, RequestId, Status};
use proptest::prelude::*;

fn arb_envelope() -> impl Strategy<Value = Envelope> {
    (
        any::<u64>(),
        any::<u64>(),
        "[a-zA-Z][a-zA-Z0-9_.]{0,40}",
        proptest::collection::vec(any::<u8>(), 0..512),
        proptest::option::of(".{0,64}"),
    )
        .prop_map(|(msb, lsb, message_type, payload, error)| {
            let id = RequestId::from_parts(msb, lsb);
            match error {
                None => Envelope::ok(id, message_type, payload),
                Some(message) => Envelope::error(id, message_type, message).with_payload(payload),
            }
        })
}

proptest! {
    #[test]
    fn prop_decode_preserves_every_field(envelope in arb_envelope()) {
        let bytes = envelope.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();

        prop_assert_eq!(decoded.request_id(), envelope.request_id());
        prop_assert_eq!(decoded.status(), envelope.status());
        prop_assert_eq!(decoded.message_type(), envelope.message_type());
        prop_assert_eq!(decoded.payload(), envelope.payload());
        prop_assert_eq!(decoded.error_message(), envelope.error_message());
        prop_assert_eq!(
            decoded.error_message().is_some(),
            decoded.status() == Status::Error
        );
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = Envelope::from_bytes(&data);
    }

    #[test]
    fn prop_single_byte_corruption_detected(
        envelope in arb_envelope(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut bytes = envelope.encode().unwrap().to_vec();
        let i = index.index(bytes.len());
        bytes[i] ^= flip;
        prop_assert!(Envelope::from_bytes(&bytes).is_err());
    }
}
