//! X25519 identity keys and fingerprints.

use std::fmt;

use rand::{CryptoRng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use x25519_dalek::{SharedSecret, StaticSecret};

use crate::errors::CryptoError;

/// Byte length of keys and fingerprints.
pub const KEY_SIZE: usize = 32;

/// A node's long-lived X25519 secret key.
///
/// The inner secret zeroizes on drop. `Debug` is redacted so the key can
/// never leak through logging.
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
}

impl PrivateKey {
    /// Generate a fresh key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a fresh key from a caller-supplied RNG.
    ///
    /// Used for deterministic tests and for cover recipients, which are
    /// generated in bulk and immediately discarded.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self { secret: StaticSecret::random_from_rng(rng) }
    }

    /// The corresponding public key.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        PublicKey { key: x25519_dalek::PublicKey::from(&self.secret) }
    }

    /// Raw secret bytes, for persistence only.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Rebuild from persisted bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { secret: StaticSecret::from(bytes) }
    }

    /// Parse from a hex string, as stored in the node's key file.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| CryptoError::InvalidKey)?;
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self::from_bytes(arr))
    }

    /// Hex encoding of the secret bytes, for persistence only.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub(crate) fn agree(&self, their: &PublicKey) -> SharedSecret {
        self.secret.diffie_hellman(&their.key)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// An X25519 public key identifying a peer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: x25519_dalek::PublicKey,
}

impl PublicKey {
    /// Rebuild from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { key: x25519_dalek::PublicKey::from(bytes) }
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.key.as_bytes()
    }

    /// Parse from a hex string, as carried in config files and headers.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| CryptoError::InvalidKey)?;
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self::from_bytes(arr))
    }

    /// Hex encoding of the key bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// SHA-256 fingerprint, the stable directory handle for this key.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(Sha256::digest(self.as_bytes()).into())
    }

    pub(crate) fn x25519(&self) -> &x25519_dalek::PublicKey {
        &self.key
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA-256 digest of a public key.
///
/// Fingerprints are unique per key: two distinct keys sharing a fingerprint
/// would be a SHA-256 collision.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; KEY_SIZE]);

impl Fingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Hex encoding, as surfaced by the control API.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fingerprint of raw secret material (used for the network key).
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_hex_round_trip() {
        let key = PrivateKey::generate();
        let public = key.public();

        let parsed = PublicKey::from_hex(&public.to_hex()).unwrap();
        assert_eq!(parsed, public);
        assert_eq!(parsed.fingerprint(), public.fingerprint());
    }

    #[test]
    fn private_key_hex_round_trip() {
        let key = PrivateKey::generate();
        let parsed = PrivateKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.public(), key.public());
    }

    #[test]
    fn distinct_keys_have_distinct_fingerprints() {
        let a = PrivateKey::generate().public();
        let b = PrivateKey::generate().public();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(PublicKey::from_hex("zz"), Err(CryptoError::InvalidKey));
        assert_eq!(PublicKey::from_hex("abcd"), Err(CryptoError::InvalidKey));
        assert!(PrivateKey::from_hex("0102").is_err());
    }

    #[test]
    fn debug_redacts_private_key() {
        let key = PrivateKey::generate();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(&key.to_hex()));
    }
}
