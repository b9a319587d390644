//! Durable record of accepted frame hashes.
//!
//! The slow half of the at-most-once guarantee: a frame whose hash is in
//! the log is rejected on re-ingest even across a restart, which is what
//! defeats replays that outlive the in-memory [`crate::DedupCache`].
//!
//! The trait is synchronous on purpose — implementations are expected to be
//! fast local storage, and a sync API keeps it callable from both async
//! tasks and plain test code. The production redb-backed implementation
//! lives in the node binary crate; [`MemoryHashLog`] here backs tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

/// Hash log failures.
///
/// Any failure here is fatal for the node: without the log it cannot
/// uphold replay resistance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashLogError {
    /// Underlying storage I/O failed.
    #[error("hash log i/o: {0}")]
    Io(String),

    /// Stored data failed to parse.
    #[error("hash log corrupt: {0}")]
    Corrupt(String),
}

/// Append-only persistent set of accepted frame hashes.
///
/// Implementations must be cheaply cloneable (share state via `Arc`) and
/// thread-safe. Compaction policy is the implementation's concern; dropping
/// entries older than a watermark is allowed and only narrows the replay
/// window, never the in-window guarantee.
pub trait HashLog: Send + Sync + 'static {
    /// Record a hash. Returns `true` iff it was not already present.
    fn insert(&self, hash: &[u8; 32]) -> Result<bool, HashLogError>;

    /// Whether a hash has been recorded.
    fn contains(&self, hash: &[u8; 32]) -> Result<bool, HashLogError>;

    /// Number of recorded hashes.
    fn len(&self) -> Result<u64, HashLogError>;
}

/// In-memory hash log for tests and ephemeral nodes.
///
/// Grows without bound; nothing survives the process.
#[derive(Default, Clone)]
pub struct MemoryHashLog {
    inner: Arc<Mutex<HashSet<[u8; 32]>>>,
}

impl MemoryHashLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<[u8; 32]>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HashLog for MemoryHashLog {
    fn insert(&self, hash: &[u8; 32]) -> Result<bool, HashLogError> {
        Ok(self.lock().insert(*hash))
    }

    fn contains(&self, hash: &[u8; 32]) -> Result<bool, HashLogError> {
        Ok(self.lock().contains(hash))
    }

    fn len(&self) -> Result<u64, HashLogError> {
        Ok(self.lock().len() as u64)
    }
}
