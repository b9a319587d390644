//! Authenticated sealed-box encryption for payload envelopes.
//!
//! Wire layout of a sealed envelope:
//!
//! ```text
//! [eph_pub: 32] [ aead( [sender_pub: 32] [auth: 32] [payload] ) + tag: 16 ]
//! ```
//!
//! Key schedule:
//!
//! - `seal_key ‖ seal_nonce = HKDF-SHA256(DH(eph, recipient),
//!   salt = eph_pub ‖ recipient_pub, info = "hiddenlake-seal-v1")`
//! - `auth = HMAC-SHA256(link_key, payload)` where `link_key =
//!   HKDF-SHA256(DH(sender, recipient), salt = sender_pub ‖ recipient_pub,
//!   info = "hiddenlake-auth-v1")`
//!
//! The ephemeral agreement hides the payload from everyone but the
//! recipient; the static-static agreement proves the sender's identity to
//! the recipient alone. Nothing outside the AEAD identifies either party,
//! so an envelope reveals only its (constant) length.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use x25519_dalek::EphemeralSecret;
use zeroize::Zeroize;

use crate::{
    errors::CryptoError,
    keys::{KEY_SIZE, PrivateKey, PublicKey},
};

type HmacSha256 = Hmac<Sha256>;

/// AEAD tag length (Poly1305).
const TAG_SIZE: usize = 16;

/// Sender public key + authentication MAC, inside the AEAD.
const SENDER_HEAD: usize = KEY_SIZE + 32;

/// Total envelope bytes beyond the payload itself.
///
/// `ciphertext_len = payload_len + ENVELOPE_OVERHEAD`; the network's
/// `message_size_bytes` must exceed this for any payload to fit.
pub const ENVELOPE_OVERHEAD: usize = KEY_SIZE + TAG_SIZE + SENDER_HEAD;

const SEAL_INFO: &[u8] = b"hiddenlake-seal-v1";
const AUTH_INFO: &[u8] = b"hiddenlake-auth-v1";

/// Seal a payload to a recipient.
///
/// The RNG feeds the ephemeral key only; payload salts are the caller's
/// concern. Cover traffic calls this with a recipient key that is dropped
/// right after, making the envelope permanently unopenable.
///
/// # Errors
///
/// `WeakKey` if the recipient key is a low-order point.
pub fn seal<R: RngCore + CryptoRng>(
    rng: &mut R,
    sender: &PrivateKey,
    recipient: &PublicKey,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let eph = EphemeralSecret::random_from_rng(rng);
    let eph_pub = x25519_dalek::PublicKey::from(&eph);

    let shared = eph.diffie_hellman(recipient.x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::WeakKey);
    }

    let (key, nonce) = derive_seal_keys(shared.as_bytes(), eph_pub.as_bytes(), recipient)?;
    let auth = link_auth(sender, &sender.public(), recipient, payload)?;

    let mut plain = Vec::with_capacity(SENDER_HEAD + payload.len());
    plain.extend_from_slice(sender.public().as_bytes());
    plain.extend_from_slice(&auth);
    plain.extend_from_slice(payload);

    let cipher = XChaCha20Poly1305::new((&key).into());
    // INVARIANT: encryption with a valid key and nonce cannot fail.
    let Ok(boxed) = cipher.encrypt(XNonce::from_slice(&nonce), plain.as_slice()) else {
        unreachable!("xchacha20-poly1305 encryption cannot fail with valid inputs");
    };
    plain.zeroize();

    let mut out = Vec::with_capacity(KEY_SIZE + boxed.len());
    out.extend_from_slice(eph_pub.as_bytes());
    out.extend_from_slice(&boxed);
    Ok(out)
}

/// Open a sealed envelope with the recipient's private key.
///
/// Returns the authenticated sender key and the payload bytes.
///
/// # Errors
///
/// `OpenFailed` on any failure — wrong recipient, cover envelope, tampered
/// ciphertext, forged sender. The cases are indistinguishable by design.
pub fn open(recipient: &PrivateKey, envelope: &[u8]) -> Result<(PublicKey, Vec<u8>), CryptoError> {
    if envelope.len() < ENVELOPE_OVERHEAD {
        return Err(CryptoError::OpenFailed);
    }

    let mut eph_bytes = [0u8; KEY_SIZE];
    eph_bytes.copy_from_slice(&envelope[..KEY_SIZE]);
    let eph_pub = PublicKey::from_bytes(eph_bytes);

    let shared = recipient.agree(&eph_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::OpenFailed);
    }

    let recipient_pub = recipient.public();
    let (key, nonce) = derive_seal_keys(shared.as_bytes(), eph_pub.as_bytes(), &recipient_pub)
        .map_err(|_| CryptoError::OpenFailed)?;

    let cipher = XChaCha20Poly1305::new((&key).into());
    let mut plain = cipher
        .decrypt(XNonce::from_slice(&nonce), &envelope[KEY_SIZE..])
        .map_err(|_| CryptoError::OpenFailed)?;

    if plain.len() < SENDER_HEAD {
        plain.zeroize();
        return Err(CryptoError::OpenFailed);
    }

    let mut sender_bytes = [0u8; KEY_SIZE];
    sender_bytes.copy_from_slice(&plain[..KEY_SIZE]);
    let sender_pub = PublicKey::from_bytes(sender_bytes);
    let payload = plain[SENDER_HEAD..].to_vec();

    let expected = link_auth(recipient, &sender_pub, &recipient_pub, &payload)
        .map_err(|_| CryptoError::OpenFailed)?;
    let verified = ct_eq(&expected, &plain[KEY_SIZE..SENDER_HEAD]);
    plain.zeroize();
    if !verified {
        return Err(CryptoError::OpenFailed);
    }

    Ok((sender_pub, payload))
}

/// Derive the AEAD key and nonce for one envelope.
fn derive_seal_keys(
    shared: &[u8],
    eph_pub: &[u8; KEY_SIZE],
    recipient: &PublicKey,
) -> Result<([u8; 32], [u8; 24]), CryptoError> {
    let mut salt = [0u8; KEY_SIZE * 2];
    salt[..KEY_SIZE].copy_from_slice(eph_pub);
    salt[KEY_SIZE..].copy_from_slice(recipient.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = [0u8; 56];
    hk.expand(SEAL_INFO, &mut okm).map_err(|_| CryptoError::WeakKey)?;

    let mut key = [0u8; 32];
    let mut nonce = [0u8; 24];
    key.copy_from_slice(&okm[..32]);
    nonce.copy_from_slice(&okm[32..]);
    okm.zeroize();
    Ok((key, nonce))
}

/// Sender-authentication MAC over the payload.
///
/// Both sides can derive the link key: the sender holds `DH(sender_priv,
/// recipient_pub)`, the recipient `DH(recipient_priv, sender_pub)`.
fn link_auth(
    own: &PrivateKey,
    sender_pub: &PublicKey,
    recipient_pub: &PublicKey,
    payload: &[u8],
) -> Result<[u8; 32], CryptoError> {
    let peer = if own.public() == *sender_pub { recipient_pub } else { sender_pub };
    let shared = own.agree(peer);
    if !shared.was_contributory() {
        return Err(CryptoError::WeakKey);
    }

    let mut salt = [0u8; KEY_SIZE * 2];
    salt[..KEY_SIZE].copy_from_slice(sender_pub.as_bytes());
    salt[KEY_SIZE..].copy_from_slice(recipient_pub.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
    let mut link_key = [0u8; 32];
    hk.expand(AUTH_INFO, &mut link_key).map_err(|_| CryptoError::WeakKey)?;

    // INVARIANT: HMAC accepts keys of any length, construction cannot fail.
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&link_key) else {
        unreachable!("hmac-sha256 accepts keys of any length");
    };
    link_key.zeroize();
    mac.update(payload);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time digest comparison without branching on content.
fn ct_eq(a: &[u8; 32], b: &[u8]) -> bool {
    if b.len() != 32 {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
