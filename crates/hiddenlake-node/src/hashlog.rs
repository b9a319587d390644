//! Redb-backed durable hash log.
//!
//! Uses redb's ACID transactions so an accepted hash survives a crash that
//! happens right after ingest. Three tables:
//!
//! - `hashes`: frame hash → insertion counter (the membership set)
//! - `sequence`: insertion counter → frame hash (compaction order)
//! - `meta`: the next counter value
//!
//! Compaction is a size watermark: when the set exceeds `max_entries`, the
//! lowest counters are deleted inside the same write transaction. Replay
//! resistance then holds for the most recent `max_entries` frames, which
//! at one frame per tick is a window of `max_entries × queue_period`.

use std::{path::Path, sync::Arc};

use hiddenlake_core::{HashLog, HashLogError};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

const HASHES: TableDefinition<&[u8], u64> = TableDefinition::new("hashes");
const SEQUENCE: TableDefinition<u64, &[u8]> = TableDefinition::new("sequence");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_COUNTER: &str = "next";

/// Durable hash log backed by redb.
///
/// Thread-safe through redb's internal locking. Clone is cheap (`Arc`).
#[derive(Clone)]
pub struct RedbHashLog {
    db: Arc<Database>,
    max_entries: u64,
}

impl RedbHashLog {
    /// Open or create a hash log at the given path.
    ///
    /// `max_entries` bounds the set; the oldest entries are compacted away
    /// once it is exceeded.
    pub fn open(path: impl AsRef<Path>, max_entries: u64) -> Result<Self, HashLogError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(HASHES).map_err(io_err)?;
            let _ = txn.open_table(SEQUENCE).map_err(io_err)?;
            let _ = txn.open_table(META).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db), max_entries: max_entries.max(1) })
    }
}

impl HashLog for RedbHashLog {
    fn insert(&self, hash: &[u8; 32]) -> Result<bool, HashLogError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let admitted = {
            let mut hashes = txn.open_table(HASHES).map_err(io_err)?;
            let mut sequence = txn.open_table(SEQUENCE).map_err(io_err)?;
            let mut meta = txn.open_table(META).map_err(io_err)?;

            if hashes.get(hash.as_slice()).map_err(io_err)?.is_some() {
                false
            } else {
                let counter =
                    meta.get(NEXT_COUNTER).map_err(io_err)?.map_or(0, |v| v.value());
                hashes.insert(hash.as_slice(), counter).map_err(io_err)?;
                sequence.insert(counter, hash.as_slice()).map_err(io_err)?;
                meta.insert(NEXT_COUNTER, counter + 1).map_err(io_err)?;

                // Watermark compaction: drop the oldest overage in-place.
                let len = hashes.len().map_err(io_err)?;
                let over = len.saturating_sub(self.max_entries);
                if over > 0 {
                    let mut victims = Vec::with_capacity(over as usize);
                    {
                        let range = sequence.range(0..=u64::MAX).map_err(io_err)?;
                        for entry in range.take(over as usize) {
                            let (seq, stored) = entry.map_err(io_err)?;
                            victims.push((seq.value(), stored.value().to_vec()));
                        }
                    }
                    for (seq, stored) in victims {
                        sequence.remove(seq).map_err(io_err)?;
                        hashes.remove(stored.as_slice()).map_err(io_err)?;
                    }
                }
                true
            }
        };

        txn.commit().map_err(io_err)?;
        Ok(admitted)
    }

    fn contains(&self, hash: &[u8; 32]) -> Result<bool, HashLogError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let hashes = txn.open_table(HASHES).map_err(io_err)?;
        Ok(hashes.get(hash.as_slice()).map_err(io_err)?.is_some())
    }

    fn len(&self) -> Result<u64, HashLogError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let hashes = txn.open_table(HASHES).map_err(io_err)?;
        hashes.len().map_err(io_err)
    }
}

fn io_err(e: impl std::fmt::Display) -> HashLogError {
    HashLogError::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> [u8; 32] {
        [n; 32]
    }

    #[test]
    fn insert_is_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = RedbHashLog::open(dir.path().join("hashes.redb"), 1024).unwrap();

        assert!(log.insert(&hash(1)).unwrap());
        assert!(!log.insert(&hash(1)).unwrap());
        assert!(log.contains(&hash(1)).unwrap());
        assert_eq!(log.len().unwrap(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.redb");

        {
            let log = RedbHashLog::open(&path, 1024).unwrap();
            assert!(log.insert(&hash(7)).unwrap());
        }

        let log = RedbHashLog::open(&path, 1024).unwrap();
        assert!(log.contains(&hash(7)).unwrap());
        assert!(!log.insert(&hash(7)).unwrap());
    }

    #[test]
    fn compacts_to_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let log = RedbHashLog::open(dir.path().join("hashes.redb"), 4).unwrap();

        for n in 0..6 {
            assert!(log.insert(&hash(n)).unwrap());
        }

        assert_eq!(log.len().unwrap(), 4);
        // Oldest entries were compacted away, newest survive.
        assert!(!log.contains(&hash(0)).unwrap());
        assert!(!log.contains(&hash(1)).unwrap());
        assert!(log.contains(&hash(5)).unwrap());

        // A compacted hash re-inserts: the window moved past it.
        assert!(log.insert(&hash(0)).unwrap());
    }

    #[test]
    fn counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.redb");

        {
            let log = RedbHashLog::open(&path, 2).unwrap();
            log.insert(&hash(1)).unwrap();
            log.insert(&hash(2)).unwrap();
        }

        let log = RedbHashLog::open(&path, 2).unwrap();
        log.insert(&hash(3)).unwrap();
        assert_eq!(log.len().unwrap(), 2);
        assert!(!log.contains(&hash(1)).unwrap());
        assert!(log.contains(&hash(2)).unwrap());
        assert!(log.contains(&hash(3)).unwrap());
    }
}
