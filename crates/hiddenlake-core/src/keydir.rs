//! Directory of authorized peer keys.
//!
//! Maps public-key fingerprints to public keys. The node consults it on
//! every decrypted payload: a sender whose fingerprint is absent is dropped
//! silently, exactly like a cover frame, so an observer cannot tell "not a
//! friend" from "not addressed to me".
//!
//! Read-mostly: decryption paths take the read lock, editor mutations the
//! write lock.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use hiddenlake_crypto::{Fingerprint, PublicKey};

/// Fingerprint → public key map shared between the node and its editors.
#[derive(Default)]
pub struct KeyDirectory {
    inner: RwLock<HashMap<Fingerprint, PublicKey>>,
}

impl KeyDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize a key. The fingerprint is derived, never caller-supplied,
    /// so two distinct keys can never share an entry.
    pub fn insert(&self, key: PublicKey) {
        self.write().insert(key.fingerprint(), key);
    }

    /// Look up a key by fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<PublicKey> {
        self.read().get(fingerprint).copied()
    }

    /// Whether a fingerprint is authorized.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.read().contains_key(fingerprint)
    }

    /// Revoke a key. Returns `true` if it was present.
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        self.write().remove(fingerprint).is_some()
    }

    /// Snapshot of all authorized keys.
    pub fn list(&self) -> Vec<PublicKey> {
        self.read().values().copied().collect()
    }

    /// Number of authorized keys.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Fingerprint, PublicKey>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Fingerprint, PublicKey>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
