//! Fuzz target for frame decoding
//!
//! # Strategy
//!
//! - Arbitrary bytes through `Frame::decode` under several profile sizes
//! - Lengths straddling the exact wire length (off-by-one both ways)
//!
//! # Invariants
//!
//! - NEVER panic on malformed wire bytes
//! - Only exact-length buffers can possibly decode
//! - Decoded frames re-encode to the identical byte string

#![no_main]

use arbitrary::Arbitrary;
use hiddenlake_proto::{Frame, FrameSettings};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    message_size: u8,
    work_bits: u8,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let settings = FrameSettings {
        network_key: "fuzz-net".to_string(),
        work_bits: u32::from(input.work_bits % 32),
        message_size: usize::from(input.message_size) + 1,
    };

    match Frame::decode(&settings, &input.bytes) {
        Ok(frame) => {
            assert_eq!(input.bytes.len(), settings.wire_len());
            assert_eq!(frame.to_vec(), input.bytes);
            assert!(frame.meets_work(settings.work_bits));
        }
        Err(_) => {}
    }
});
