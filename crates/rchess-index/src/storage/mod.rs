//! Spill / persistence boundary for position edges
//!
//! The graph only needs `get`, `put` and a full scan from a backend.
//! Shallow positions stay in memory ([`crate::graph::TieredGraph`]); deep,
//! rarely revisited positions go through this interface.
//!
//! Backends never retry: every I/O failure is returned to the caller.

mod file;

pub use file::FileBackend;

use std::collections::BTreeMap;

use crate::error::StorageResult;
use crate::graph::EdgeRecord;
use crate::position::PositionKey;

/// Lazy scan over every stored `(key, edges)` pair
pub type EntryIter<'a> = Box<dyn Iterator<Item = StorageResult<(PositionKey, Vec<EdgeRecord>)>> + 'a>;

/// Key-value store for per-position edge lists.
///
/// `put` replaces the whole edge list of a key.
pub trait StorageBackend: Send + Sync {
    /// Edges stored for `key`, `None` if the key was never written
    fn get(&self, key: PositionKey) -> StorageResult<Option<Vec<EdgeRecord>>>;

    fn put(&mut self, key: PositionKey, edges: &[EdgeRecord]) -> StorageResult<()>;

    /// All entries in ascending key order
    fn iterate_all(&self) -> StorageResult<EntryIter<'_>>;

    /// Number of stored keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every completed `put` durable
    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

/// In-memory backend (tests, small datasets)
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<PositionKey, Vec<EdgeRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: PositionKey) -> StorageResult<Option<Vec<EdgeRecord>>> {
        Ok(self.entries.get(&key).cloned())
    }

    fn put(&mut self, key: PositionKey, edges: &[EdgeRecord]) -> StorageResult<()> {
        self.entries.insert(key, edges.to_vec());
        Ok(())
    }

    fn iterate_all(&self) -> StorageResult<EntryIter<'_>> {
        Ok(Box::new(
            self.entries.iter().map(|(k, v)| Ok((*k, v.clone()))),
        ))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Move;

    #[test]
    fn test_memory_backend_put_replaces() {
        let mut backend = MemoryBackend::new();
        let key = PositionKey(7);
        let edge = EdgeRecord {
            mv: Move::from_uci("e2e4").unwrap(),
            to: PositionKey(8),
            frequency: 1,
        };
        assert!(backend.get(key).unwrap().is_none());
        backend.put(key, &[edge]).unwrap();
        backend.put(key, &[EdgeRecord { frequency: 3, ..edge }]).unwrap();
        assert_eq!(backend.get(key).unwrap().unwrap()[0].frequency, 3);
        assert_eq!(backend.len(), 1);

        let all: Vec<_> = backend.iterate_all().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, key);
    }
}
