//! Identity keys and sealed payload encryption.
//!
//! Two building blocks for the overlay:
//!
//! - [`PrivateKey`] / [`PublicKey`]: X25519 identity keypairs with SHA-256
//!   [`Fingerprint`]s. The fingerprint is the stable handle peers use in
//!   their key directories.
//! - [`seal`] / [`open`]: an authenticated sealed box. A payload is
//!   encrypted to one recipient public key with a fresh ephemeral key, and
//!   the sender proves its identity through a static-static key agreement
//!   rather than a signature — so only the recipient learns who sent it.
//!
//! Cover traffic seals to a recipient key that is generated and immediately
//! discarded. [`open`] fails on such envelopes with the same opaque error
//! as on any misaddressed real envelope, which is what keeps covers
//! indistinguishable from traffic meant for someone else.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod keys;
mod sealed;

pub use errors::CryptoError;
pub use keys::{Fingerprint, KEY_SIZE, PrivateKey, PublicKey};
pub use sealed::{ENVELOPE_OVERHEAD, open, seal};
