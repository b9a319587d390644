//! Protocol error types.
//!
//! Structured errors for frame and codec validation. Variants carry the
//! expected/actual values so callers can log actionable diagnostics, but the
//! ingest path is expected to drop malformed wire input silently rather than
//! echo these back to peers.

use thiserror::Error;

/// Errors produced while encoding or decoding wire formats.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame length does not match the network profile.
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame {
        /// Exact wire length required by the profile.
        expected: usize,
        /// Length of the received buffer.
        actual: usize,
    },

    /// Network-key MAC verification failed.
    #[error("frame mac does not verify under this network key")]
    InvalidMac,

    /// Frame hash does not meet the proof-of-work difficulty.
    #[error("insufficient work: {got} leading zero bits, need {need}")]
    InsufficientWork {
        /// Leading zero bits of the frame hash.
        got: u32,
        /// Difficulty required by the network profile.
        need: u32,
    },

    /// Ciphertext length differs from the profile's message size.
    #[error("ciphertext size mismatch: expected {expected} bytes, got {actual}")]
    CiphertextSize {
        /// `message_size_bytes` from the profile.
        expected: usize,
        /// Length of the provided ciphertext.
        actual: usize,
    },

    /// Payload body does not fit within the padded envelope.
    #[error("payload too large: {size} bytes exceeds limit {max}")]
    PayloadTooLarge {
        /// Size of the offending body.
        size: usize,
        /// Maximum body size for this envelope.
        max: usize,
    },

    /// A length prefix points past the end of the buffer.
    #[error("truncated field: need {need} more bytes, {left} left")]
    Truncated {
        /// Bytes the prefix claims.
        need: usize,
        /// Bytes remaining in the buffer.
        left: usize,
    },

    /// A string field holds invalid UTF-8.
    #[error("invalid utf-8 in {field}")]
    InvalidString {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A field exceeds the codec's fixed prefix width.
    #[error("{field} too long: {size} bytes exceeds {max}")]
    FieldTooLarge {
        /// Name of the offending field.
        field: &'static str,
        /// Size of the offending value.
        size: usize,
        /// Largest value the prefix can express.
        max: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
