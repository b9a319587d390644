//! Bounded deduplication cache over frame hashes.
//!
//! The fast half of the at-most-once guarantee. Every frame passes through
//! here twice: adapters admit inbound frames before delivering them to the
//! node, and the dispatch loop records outbound frames before producing
//! them — so a frame this node emitted is rejected if the mesh echoes it
//! back, and a frame received on two transports is delivered once.
//!
//! The durable counterpart that survives restarts is [`crate::HashLog`].

use std::{
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

use lru::LruCache;

/// LRU set of recently seen frame hashes.
///
/// Single-writer mutex inside; cheap to share behind an `Arc`. Capacity is
/// fixed at construction, eviction is strictly least-recently-seen.
pub struct DedupCache {
    inner: Mutex<LruCache<[u8; 32], ()>>,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` hashes.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Record a hash. Returns `true` iff it was not already present —
    /// i.e. the frame is admitted and should be processed.
    pub fn insert(&self, hash: &[u8; 32]) -> bool {
        self.lock().put(*hash, ()).is_none()
    }

    /// Whether a hash is currently cached. Does not touch recency.
    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.lock().contains(hash)
    }

    /// Number of cached hashes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<[u8; 32], ()>> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the cache itself stays structurally valid.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> [u8; 32] {
        [n; 32]
    }

    fn cache(capacity: usize) -> DedupCache {
        DedupCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn admits_each_hash_once() {
        let cache = cache(4);
        assert!(cache.insert(&hash(1)));
        assert!(!cache.insert(&hash(1)));
        assert!(cache.insert(&hash(2)));
    }

    #[test]
    fn evicts_least_recent_at_capacity() {
        let cache = cache(2);
        assert!(cache.insert(&hash(1)));
        assert!(cache.insert(&hash(2)));
        assert!(cache.insert(&hash(3))); // evicts 1

        assert!(!cache.contains(&hash(1)));
        assert!(cache.contains(&hash(2)));
        assert!(cache.insert(&hash(1))); // re-admitted after eviction
    }

    #[test]
    fn duplicate_insert_refreshes_recency() {
        let cache = cache(2);
        cache.insert(&hash(1));
        cache.insert(&hash(2));
        assert!(!cache.insert(&hash(1))); // 1 becomes most recent
        cache.insert(&hash(3)); // evicts 2, not 1

        assert!(cache.contains(&hash(1)));
        assert!(!cache.contains(&hash(2)));
    }
}
