//! Wire-level codecs for the Hidden Lake overlay network.
//!
//! This crate defines the byte formats that peers agree on:
//!
//! - [`Frame`]: the fixed-size unit on the wire, authenticated by a
//!   network-keyed MAC and carrying a proof-of-work nonce
//! - [`Payload`]: the plaintext envelope inside a frame (tag + salt + body)
//! - [`Request`] / [`Response`]: the length-prefixed HTTP-like messages
//!   carried inside payload bodies
//!
//! Everything here is pure: no I/O, no randomness, no clocks. Salts, nonces
//! and keys are provided by the caller, which keeps the codecs deterministic
//! and directly testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod errors;
mod frame;
mod payload;
mod request;
mod response;

pub use errors::{ProtocolError, Result};
pub use frame::{Frame, FrameSettings, leading_zero_bits, work_digest};
pub use payload::{Payload, tags};
pub use request::Request;
pub use response::Response;
