//! Crypto error types.

use thiserror::Error;

/// Errors from key handling and sealed-box operations.
///
/// [`CryptoError::OpenFailed`] is deliberately opaque: the ingest path must
/// not be able to tell a cover envelope from a real envelope addressed to
/// someone else, so no failure reason is carried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The envelope could not be opened with this private key.
    #[error("envelope does not open with this key")]
    OpenFailed,

    /// A key could not be parsed from its serialized form.
    #[error("invalid key encoding")]
    InvalidKey,

    /// Key agreement produced a non-contributory shared secret.
    ///
    /// Happens only for maliciously crafted low-order public keys; such
    /// peers are refused outright.
    #[error("weak public key refused")]
    WeakKey,
}
