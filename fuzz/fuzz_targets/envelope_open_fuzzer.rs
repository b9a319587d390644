//! Fuzz target for sealed envelope opening
//!
//! # Strategy
//!
//! - Arbitrary ciphertexts against a fixed recipient key
//! - Truncations around the envelope overhead boundary
//!
//! # Invariants
//!
//! - NEVER panic on hostile envelopes
//! - Forged envelopes fail with the single opaque error

#![no_main]

use hiddenlake_crypto::{CryptoError, PrivateKey, open};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|bytes: &[u8]| {
    let recipient = PrivateKey::from_bytes([7u8; 32]);
    match open(&recipient, bytes) {
        Ok(_) => panic!("arbitrary bytes must not open as a sealed envelope"),
        Err(CryptoError::OpenFailed) => {}
        Err(other) => panic!("unexpected error kind: {other:?}"),
    }
});
