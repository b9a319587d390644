//! The fixed-size network frame.
//!
//! Layout on the wire (Big Endian, no length prefix — readers know the size
//! from the network profile):
//!
//! ```text
//! [mac: 32 bytes] [nonce: 8 bytes] [ciphertext: message_size bytes]
//! ```
//!
//! - `mac` is HMAC-SHA256 over `nonce ‖ ciphertext`, keyed by the network
//!   key. It binds the frame to one mesh: peers on a different network
//!   silently reject it.
//! - `nonce` is the proof-of-work counter. The frame hash is SHA-256 over
//!   `mac ‖ nonce ‖ ciphertext` and must carry at least `work_bits` leading
//!   zero bits.
//! - `ciphertext` is the sealed payload. Its length is constant for every
//!   frame on a network, which is what makes cover traffic and real traffic
//!   indistinguishable by shape.
//!
//! Frames are immutable once constructed; the hash is computed eagerly and
//! reused by the deduplication layers.

use bytes::{BufMut, Bytes};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fixed frame head preceding the ciphertext (40 bytes).
///
/// All fields are raw byte arrays, so any 40-byte pattern is a valid head
/// and parsing from untrusted bytes cannot fault.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct FrameHead {
    mac: [u8; 32],
    nonce: [u8; 8],
}

/// Per-network parameters every frame is validated against.
///
/// All participants of one mesh must agree on every field; the network key
/// doubles as the MAC secret, so disagreement shows up as `InvalidMac`
/// rather than as garbled plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSettings {
    /// Shared secret identifying the mesh; keys the frame MAC.
    pub network_key: String,
    /// Required leading zero bits of the frame hash.
    pub work_bits: u32,
    /// Exact ciphertext length in bytes.
    pub message_size: usize,
}

impl FrameSettings {
    /// Total wire length of a frame under these settings.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        Frame::HEAD_SIZE + self.message_size
    }
}

/// A validated network frame.
///
/// # Invariants
///
/// - `ciphertext.len()` equals the settings' `message_size` (enforced by
///   [`Frame::construct`] and [`Frame::decode`]).
/// - `hash` is SHA-256 over the full wire bytes.
/// - [`Frame::decode`] additionally guarantees the MAC verifies and the
///   hash meets the work difficulty; [`Frame::construct`] does not check
///   work, since miners construct candidates to test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    mac: [u8; 32],
    nonce: u64,
    ciphertext: Bytes,
    hash: [u8; 32],
}

impl Frame {
    /// Size of the MAC + nonce head (40 bytes).
    pub const HEAD_SIZE: usize = 40;

    /// Build a frame from a ciphertext and a chosen work nonce.
    ///
    /// Computes the network MAC and the frame hash. Does not check the
    /// proof-of-work difficulty — use [`Frame::meets_work`] or decode the
    /// wire bytes to validate a received frame.
    ///
    /// # Errors
    ///
    /// `CiphertextSize` if the ciphertext length differs from the profile.
    pub fn construct(settings: &FrameSettings, ciphertext: Bytes, nonce: u64) -> Result<Self> {
        if ciphertext.len() != settings.message_size {
            return Err(ProtocolError::CiphertextSize {
                expected: settings.message_size,
                actual: ciphertext.len(),
            });
        }

        let nonce_bytes = nonce.to_be_bytes();
        let mac = network_mac(&settings.network_key, nonce_bytes, &ciphertext);
        let hash = frame_hash(&mac, nonce_bytes, &ciphertext);

        Ok(Self { mac, nonce, ciphertext, hash })
    }

    /// Parse and validate a frame from wire bytes.
    ///
    /// Validation order is cheapest-first: length, MAC, work. A frame that
    /// fails any step must be dropped silently by the ingest path — the
    /// error exists for logging at the trace level only.
    ///
    /// # Errors
    ///
    /// - `InvalidFrame` if the buffer is not exactly `wire_len` bytes
    /// - `InvalidMac` if the MAC does not verify under the network key
    /// - `InsufficientWork` if the hash misses the difficulty target
    pub fn decode(settings: &FrameSettings, bytes: &[u8]) -> Result<Self> {
        let expected = settings.wire_len();
        if bytes.len() != expected {
            return Err(ProtocolError::InvalidFrame { expected, actual: bytes.len() });
        }

        // INVARIANT: length was checked above, the prefix split cannot fail.
        let Ok((head, ciphertext)) = FrameHead::ref_from_prefix(bytes) else {
            return Err(ProtocolError::InvalidFrame { expected, actual: bytes.len() });
        };

        let mac = network_mac(&settings.network_key, head.nonce, ciphertext);
        if !constant_time_eq(&mac, &head.mac) {
            return Err(ProtocolError::InvalidMac);
        }

        let hash = frame_hash(&head.mac, head.nonce, ciphertext);
        let got = leading_zero_bits(&hash);
        if got < settings.work_bits {
            return Err(ProtocolError::InsufficientWork { got, need: settings.work_bits });
        }

        Ok(Self {
            mac: head.mac,
            nonce: u64::from_be_bytes(head.nonce),
            ciphertext: Bytes::copy_from_slice(ciphertext),
            hash,
        })
    }

    /// Append the wire encoding to a buffer.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.mac);
        dst.put_slice(&self.nonce.to_be_bytes());
        dst.put_slice(&self.ciphertext);
    }

    /// Wire encoding as an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEAD_SIZE + self.ciphertext.len());
        self.encode(&mut buf);
        buf
    }

    /// SHA-256 digest over the full wire bytes.
    ///
    /// This is the identity used by the dedup cache and the hash log.
    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// The proof-of-work nonce.
    #[must_use]
    pub fn proof(&self) -> u64 {
        self.nonce
    }

    /// The sealed payload carried by this frame.
    #[must_use]
    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    /// Whether the frame hash meets a difficulty target.
    #[must_use]
    pub fn meets_work(&self, work_bits: u32) -> bool {
        leading_zero_bits(&self.hash) >= work_bits
    }
}

/// Hash a candidate `(nonce, ciphertext)` pair under the given settings.
///
/// Equivalent to constructing the frame and reading its hash, but without
/// allocating — miners call this in their inner loop.
#[must_use]
pub fn work_digest(settings: &FrameSettings, nonce: u64, ciphertext: &[u8]) -> [u8; 32] {
    let nonce_bytes = nonce.to_be_bytes();
    let mac = network_mac(&settings.network_key, nonce_bytes, ciphertext);
    frame_hash(&mac, nonce_bytes, ciphertext)
}

/// Count the leading zero bits of a 256-bit digest.
#[must_use]
pub fn leading_zero_bits(digest: &[u8; 32]) -> u32 {
    let mut bits = 0;
    for byte in digest {
        if *byte == 0 {
            bits += 8;
            continue;
        }
        bits += byte.leading_zeros();
        break;
    }
    bits
}

fn network_mac(network_key: &str, nonce: [u8; 8], ciphertext: &[u8]) -> [u8; 32] {
    // INVARIANT: HMAC accepts keys of any length, construction cannot fail.
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(network_key.as_bytes()) else {
        unreachable!("hmac-sha256 accepts keys of any length");
    };
    mac.update(&nonce);
    mac.update(ciphertext);
    mac.finalize().into_bytes().into()
}

fn frame_hash(mac: &[u8; 32], nonce: [u8; 8], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(mac);
    hasher.update(nonce);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

/// Compare two digests without an early exit on the first mismatch.
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FrameSettings {
        FrameSettings { network_key: "test-net".to_string(), work_bits: 0, message_size: 64 }
    }

    fn mine(settings: &FrameSettings, ciphertext: &Bytes, work_bits: u32) -> Frame {
        let mut nonce = 0u64;
        loop {
            let digest = work_digest(settings, nonce, ciphertext);
            if leading_zero_bits(&digest) >= work_bits {
                return Frame::construct(settings, ciphertext.clone(), nonce).unwrap();
            }
            nonce += 1;
        }
    }

    #[test]
    fn round_trip() {
        let settings = settings();
        let ciphertext = Bytes::from(vec![0xA5; 64]);
        let frame = Frame::construct(&settings, ciphertext, 7).unwrap();

        let wire = frame.to_vec();
        assert_eq!(wire.len(), settings.wire_len());

        let parsed = Frame::decode(&settings, &wire).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.proof(), 7);
    }

    #[test]
    fn rejects_wrong_length() {
        let settings = settings();
        let err = Frame::decode(&settings, &[0u8; 10]).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidFrame { expected: 104, actual: 10 });
    }

    #[test]
    fn rejects_foreign_network_key() {
        let settings = settings();
        let frame = Frame::construct(&settings, Bytes::from(vec![1u8; 64]), 0).unwrap();

        let other = FrameSettings { network_key: "other-net".to_string(), ..settings };
        assert_eq!(Frame::decode(&other, &frame.to_vec()), Err(ProtocolError::InvalidMac));
    }

    #[test]
    fn rejects_flipped_ciphertext_bit() {
        let settings = settings();
        let frame = Frame::construct(&settings, Bytes::from(vec![1u8; 64]), 0).unwrap();

        let mut wire = frame.to_vec();
        wire[Frame::HEAD_SIZE] ^= 0x01;
        assert_eq!(Frame::decode(&settings, &wire), Err(ProtocolError::InvalidMac));
    }

    #[test]
    fn enforces_work_difficulty() {
        let mut settings = settings();
        settings.work_bits = 8;
        let ciphertext = Bytes::from(vec![0x3C; 64]);

        let mined = mine(&settings, &ciphertext, 8);
        assert!(mined.meets_work(8));
        assert!(Frame::decode(&settings, &mined.to_vec()).is_ok());

        // A frame mined for zero difficulty will almost surely miss 24 bits.
        settings.work_bits = 24;
        let weak = mine(&settings, &ciphertext, 0);
        if !weak.meets_work(24) {
            assert!(matches!(
                Frame::decode(&settings, &weak.to_vec()),
                Err(ProtocolError::InsufficientWork { .. })
            ));
        }
    }

    #[test]
    fn rejects_wrong_ciphertext_size() {
        let settings = settings();
        let err = Frame::construct(&settings, Bytes::from(vec![0u8; 63]), 0).unwrap_err();
        assert_eq!(err, ProtocolError::CiphertextSize { expected: 64, actual: 63 });
    }

    #[test]
    fn leading_zero_bits_counts_across_bytes() {
        let mut digest = [0u8; 32];
        assert_eq!(leading_zero_bits(&digest), 256);

        digest[0] = 0x01;
        assert_eq!(leading_zero_bits(&digest), 7);

        digest[0] = 0x00;
        digest[1] = 0x80;
        assert_eq!(leading_zero_bits(&digest), 8);

        digest[1] = 0x10;
        assert_eq!(leading_zero_bits(&digest), 11);
    }
}
