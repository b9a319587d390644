//! The plaintext envelope carried inside a frame.
//!
//! A payload is what a node encrypts to one recipient:
//!
//! ```text
//! [tag: 4 bytes] [salt: 8 bytes] [body_len: 8 bytes] [body] [zero padding]
//! ```
//!
//! The envelope is padded to a fixed size before encryption so that every
//! ciphertext on a network has identical length. The salt is chosen fresh
//! per construction, which makes two encryptions of the same body produce
//! unrelated frame hashes.

use bytes::Bytes;

use crate::{
    codec::Reader,
    errors::{ProtocolError, Result},
};

/// Well-known payload tags.
///
/// The tag routes a decrypted payload to a registered handler. Tags are an
/// open 32-bit space; these three are reserved by the overlay itself.
pub mod tags {
    /// Cover traffic. Never dispatched: cover payloads are sealed to a
    /// recipient key that no node holds, so no one ever decrypts one.
    pub const COVER: u32 = 0x0000_0000;

    /// A service request addressed to a local endpoint behind the node.
    pub const SERVICE: u32 = 0x0000_0053;

    /// The response half of a fetch round-trip.
    pub const RESPONSE: u32 = 0x0000_0052;
}

/// A tagged, salted application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Protocol selector; see [`tags`].
    pub tag: u32,
    /// Sender-chosen salt, random per construction.
    pub salt: u64,
    /// Application bytes.
    pub body: Bytes,
}

impl Payload {
    /// Fixed envelope head: tag + salt + body length.
    pub const OVERHEAD: usize = 4 + 8 + 8;

    /// Create a payload. The salt must come from a cryptographic RNG.
    #[must_use]
    pub fn new(tag: u32, salt: u64, body: impl Into<Bytes>) -> Self {
        Self { tag, salt, body: body.into() }
    }

    /// Largest body that fits in an envelope of `size` bytes.
    #[must_use]
    pub fn body_limit(size: usize) -> usize {
        size.saturating_sub(Self::OVERHEAD)
    }

    /// Encode into a zero-padded buffer of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the body does not fit.
    pub fn encode(&self, size: usize) -> Result<Vec<u8>> {
        let max = Self::body_limit(size);
        if self.body.len() > max {
            return Err(ProtocolError::PayloadTooLarge { size: self.body.len(), max });
        }

        let mut buf = vec![0u8; size];
        buf[0..4].copy_from_slice(&self.tag.to_be_bytes());
        buf[4..12].copy_from_slice(&self.salt.to_be_bytes());
        buf[12..20].copy_from_slice(&(self.body.len() as u64).to_be_bytes());
        buf[20..20 + self.body.len()].copy_from_slice(&self.body);
        Ok(buf)
    }

    /// Decode from a padded envelope.
    ///
    /// Trailing padding is ignored; only `body_len` bytes are taken. The
    /// length field is validated against the buffer before any copy.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let tag = reader.read_u32()?;
        let salt = reader.read_u64()?;

        let body_len = reader.read_u64()?;
        let body_len = usize::try_from(body_len).map_err(|_| ProtocolError::Truncated {
            need: usize::MAX,
            left: reader.remaining(),
        })?;
        let body = reader.take(body_len)?;

        Ok(Self { tag, salt, body: Bytes::copy_from_slice(body) })
    }
}
