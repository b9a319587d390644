//! Payload encryption bound to one identity and one network profile.
//!
//! [`MessageClient`] owns the node's private key and the frame settings,
//! and turns [`Payload`]s into fixed-size ciphertexts and back. Every
//! ciphertext it produces has exactly the network's message size, real or
//! cover — the uniformity property starts here.

use bytes::Bytes;
use hiddenlake_crypto::{ENVELOPE_OVERHEAD, PrivateKey, PublicKey, open, seal};
use hiddenlake_proto::{FrameSettings, Payload};
use rand::rngs::OsRng;

use crate::{
    error::NodeError,
    profile::ProfileError,
};

/// Seals and opens payload envelopes for one node identity.
pub struct MessageClient {
    key: PrivateKey,
    frame: FrameSettings,
    payload_size: usize,
}

impl MessageClient {
    /// Bind an identity to a network's frame settings.
    ///
    /// # Errors
    ///
    /// `ProfileError::Invalid` if the message size cannot hold an envelope.
    pub fn new(key: PrivateKey, frame: FrameSettings) -> Result<Self, ProfileError> {
        let floor = ENVELOPE_OVERHEAD + Payload::OVERHEAD;
        if frame.message_size <= floor {
            return Err(ProfileError::Invalid {
                name: frame.network_key.clone(),
                reason: format!(
                    "message size {} cannot hold an envelope (floor {floor})",
                    frame.message_size,
                ),
            });
        }
        let payload_size = frame.message_size - ENVELOPE_OVERHEAD;
        Ok(Self { key, frame, payload_size })
    }

    /// This node's public identity.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        self.key.public()
    }

    /// Frame settings of the bound network.
    #[must_use]
    pub fn frame_settings(&self) -> &FrameSettings {
        &self.frame
    }

    /// Largest payload body that fits in one frame.
    #[must_use]
    pub fn payload_limit(&self) -> usize {
        Payload::body_limit(self.payload_size)
    }

    /// Encrypt a payload to a recipient. The result is always exactly the
    /// network's message size.
    pub fn encrypt(&self, recipient: &PublicKey, payload: &Payload) -> Result<Bytes, NodeError> {
        let padded = payload.encode(self.payload_size)?;
        let sealed = seal(&mut OsRng, &self.key, recipient, &padded)?;
        debug_assert_eq!(sealed.len(), self.frame.message_size);
        Ok(Bytes::from(sealed))
    }

    /// Encrypt a cover payload to a freshly generated, immediately
    /// discarded recipient. No node on the mesh can open the result, and
    /// the sender identity inside is a throwaway too.
    pub fn encrypt_cover(&self, payload: &Payload) -> Result<Bytes, NodeError> {
        let padded = payload.encode(self.payload_size)?;
        let sender = PrivateKey::generate_with(&mut OsRng);
        let recipient = PrivateKey::generate_with(&mut OsRng).public();
        let sealed = seal(&mut OsRng, &sender, &recipient, &padded)?;
        debug_assert_eq!(sealed.len(), self.frame.message_size);
        Ok(Bytes::from(sealed))
    }

    /// Try to open a ciphertext with this node's key.
    ///
    /// Fails opaquely for covers and for envelopes addressed elsewhere.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<(PublicKey, Payload), NodeError> {
        let (sender, padded) = open(&self.key, ciphertext)?;
        let payload = Payload::decode(&padded)?;
        Ok((sender, payload))
    }
}
