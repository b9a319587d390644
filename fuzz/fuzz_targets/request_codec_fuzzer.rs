//! Fuzz target for the request/response/payload codecs
//!
//! # Strategy
//!
//! - Arbitrary bytes through every length-prefixed decoder
//! - Hostile prefixes claiming lengths far past the buffer
//!
//! # Invariants
//!
//! - NEVER panic, NEVER over-read (hostile lengths fail with Truncated)
//! - Anything that decodes re-encodes to an equal value

#![no_main]

use hiddenlake_proto::{Payload, Request, Response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|bytes: &[u8]| {
    if let Ok(request) = Request::from_bytes(bytes) {
        let wire = request.to_bytes().expect("decoded request must re-encode");
        assert_eq!(Request::from_bytes(&wire).expect("round trip"), request);
    }

    if let Ok(response) = Response::from_bytes(bytes) {
        let wire = response.to_bytes().expect("decoded response must re-encode");
        assert_eq!(Response::from_bytes(&wire).expect("round trip"), response);
    }

    let _ = Payload::decode(bytes);
});
