//! Property tests over the wire codecs.
//!
//! Round-trip identities plus the parsing invariants that matter on a
//! hostile wire: no panic on arbitrary bytes, hard rejection of any length
//! that disagrees with the profile.

use bytes::Bytes;
use hiddenlake_proto::{Frame, FrameSettings, Payload, Request, Response, leading_zero_bits};
use proptest::prelude::*;

fn settings(message_size: usize) -> FrameSettings {
    FrameSettings { network_key: "prop-net".to_string(), work_bits: 0, message_size }
}

proptest! {
    #[test]
    fn frame_round_trip(ciphertext in prop::collection::vec(any::<u8>(), 32..256), nonce: u64) {
        let settings = settings(ciphertext.len());
        let frame = Frame::construct(&settings, Bytes::from(ciphertext), nonce).unwrap();

        let parsed = Frame::decode(&settings, &frame.to_vec()).unwrap();
        prop_assert_eq!(&parsed, &frame);
        prop_assert_eq!(parsed.hash(), frame.hash());
    }

    #[test]
    fn frame_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let settings = settings(128);
        let _ = Frame::decode(&settings, &bytes);
    }

    #[test]
    fn frame_rejects_any_other_length(extra in 1usize..64) {
        let settings = settings(128);
        let frame = Frame::construct(&settings, Bytes::from(vec![0u8; 128]), 0).unwrap();

        let mut wire = frame.to_vec();
        let padded = wire.len() + extra;
        wire.resize(padded, 0);
        prop_assert!(Frame::decode(&settings, &wire).is_err());
        prop_assert!(Frame::decode(&settings, &wire[..wire.len() - 2 * extra]).is_err());
    }

    #[test]
    fn payload_round_trip(tag: u32, salt: u64, body in prop::collection::vec(any::<u8>(), 0..200)) {
        let size = Payload::OVERHEAD + 256;
        let payload = Payload::new(tag, salt, body);

        let encoded = payload.encode(size).unwrap();
        prop_assert_eq!(encoded.len(), size);
        prop_assert_eq!(Payload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn payload_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Payload::decode(&bytes);
    }

    #[test]
    fn request_round_trip(
        method in "[A-Z]{3,7}",
        host in "[a-z0-9-]{1,32}",
        path in "/[a-z0-9/]{0,32}",
        head in prop::collection::btree_map("[A-Za-z-]{1,16}", "[ -~]{0,32}", 0..8),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut request = Request::new(method, host, path).with_body(body);
        request.head = head;

        let wire = request.to_bytes().unwrap();
        prop_assert_eq!(Request::from_bytes(&wire).unwrap(), request);
    }

    #[test]
    fn request_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Request::from_bytes(&bytes);
    }

    #[test]
    fn response_round_trip(
        code: u16,
        head in prop::collection::btree_map("[A-Za-z-]{1,16}", "[ -~]{0,32}", 0..8),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut response = Response::new(code).with_body(body);
        response.head = head;

        let wire = response.to_bytes().unwrap();
        prop_assert_eq!(Response::from_bytes(&wire).unwrap(), response);
    }

    #[test]
    fn work_bound_holds_for_decoded_frames(nonce: u64) {
        // Whatever difficulty a frame is decoded under, its hash satisfies it.
        let mut settings = settings(64);
        let frame = Frame::construct(&settings, Bytes::from(vec![7u8; 64]), nonce).unwrap();

        let bits = leading_zero_bits(frame.hash());
        settings.work_bits = bits;
        prop_assert!(Frame::decode(&settings, &frame.to_vec()).is_ok());

        if bits < 255 {
            settings.work_bits = bits + 1;
            prop_assert!(Frame::decode(&settings, &frame.to_vec()).is_err());
        }
    }
}
