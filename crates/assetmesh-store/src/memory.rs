//! In-memory implementation of the FilterStorage trait.
//!
//! This is primarily for testing. Clones share the same contents, so a test
//! can hand one clone to a store, drop the store, and reopen from another
//! clone to simulate a reboot.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use assetmesh_core::{FilterId, MasterSummary};

use crate::error::{StorageError, StorageResult};
use crate::traits::{FilterStorage, StoredFilter};

/// In-memory storage implementation.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    filters: BTreeMap<FilterId, Vec<u8>>,
    master: Option<MasterSummary>,
    /// When set, every write fails. Used to exercise fire-and-forget paths.
    fail_writes: bool,
    writes: usize,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.fail_writes = fail;
        }
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.read().map(|inner| inner.writes).unwrap_or(0)
    }

    /// Raw persisted bytes of a filter.
    pub fn filter_bytes(&self, id: FilterId) -> Option<Vec<u8>> {
        self.read().ok()?.filters.get(&id).cloned()
    }

    /// Overwrite persisted state directly, bypassing the store.
    pub fn corrupt_master(&self, master: MasterSummary) {
        if let Ok(mut inner) = self.inner.write() {
            inner.master = Some(master);
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, MemoryStorageInner>> {
        self.inner.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryStorageInner>> {
        let mut inner = self.inner.write().map_err(|_| StorageError::LockPoisoned)?;
        if inner.fail_writes {
            return Err(StorageError::InvalidData("simulated write failure".into()));
        }
        inner.writes += 1;
        Ok(inner)
    }
}

impl FilterStorage for MemoryStorage {
    fn load_filters(&self) -> StorageResult<Vec<StoredFilter>> {
        let inner = self.read()?;
        Ok(inner
            .filters
            .iter()
            .map(|(&id, bytes)| StoredFilter {
                id,
                bytes: bytes.clone(),
            })
            .collect())
    }

    fn load_master(&self) -> StorageResult<Option<MasterSummary>> {
        Ok(self.read()?.master)
    }

    fn persist_filter(&self, id: FilterId, bytes: &[u8]) -> StorageResult<()> {
        self.write()?.filters.insert(id, bytes.to_vec());
        Ok(())
    }

    fn remove_filter(&self, id: FilterId) -> StorageResult<()> {
        self.write()?.filters.remove(&id);
        Ok(())
    }

    fn persist_master(&self, master: &MasterSummary) -> StorageResult<()> {
        self.write()?.master = Some(*master);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut inner = self.write()?;
        inner.filters.clear();
        inner.master = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let storage = MemoryStorage::new();
        storage.persist_filter(FilterId(2), b"two").unwrap();
        storage.persist_filter(FilterId(1), b"one").unwrap();
        storage.persist_master(&MasterSummary::new(4, 0xBEEF)).unwrap();

        let filters = storage.load_filters().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].id, FilterId(1));
        assert_eq!(filters[1].bytes, b"two".to_vec());
        assert_eq!(storage.load_master().unwrap(), Some(MasterSummary::new(4, 0xBEEF)));
    }

    #[test]
    fn test_clones_share_contents() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.persist_filter(FilterId(9), b"x").unwrap();
        assert_eq!(other.filter_bytes(FilterId(9)), Some(b"x".to_vec()));
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = MemoryStorage::new();
        storage.persist_filter(FilterId(1), b"a").unwrap();
        storage.remove_filter(FilterId(1)).unwrap();
        storage.remove_filter(FilterId(1)).unwrap();
        assert!(storage.load_filters().unwrap().is_empty());

        storage.persist_master(&MasterSummary::new(1, 1)).unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.load_master().unwrap(), None);
    }

    #[test]
    fn test_simulated_write_failure() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.persist_filter(FilterId(1), b"a").is_err());
        assert_eq!(storage.write_count(), 0);

        storage.set_fail_writes(false);
        storage.persist_filter(FilterId(1), b"a").unwrap();
        assert_eq!(storage.write_count(), 1);
    }
}
