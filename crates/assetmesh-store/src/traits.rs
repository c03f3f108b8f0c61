//! FilterStorage trait: the abstract interface for flash persistence.
//!
//! The store writes through this trait after each successful commit and reads
//! from it once at boot. Implementations include SQLite (host-side flash
//! emulation) and in-memory (for tests).

use assetmesh_core::{FilterId, MasterSummary};

use crate::error::StorageResult;

/// A filter blob as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFilter {
    pub id: FilterId,
    pub bytes: Vec<u8>,
}

/// Persistent storage of committed filters and the master record.
///
/// Calls are synchronous. The store treats every write as fire-and-forget:
/// failures are logged and never retried, and the in-memory committed set
/// stays authoritative.
pub trait FilterStorage: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Boot
    // ─────────────────────────────────────────────────────────────────────────

    /// Load every persisted filter, in ascending id order.
    fn load_filters(&self) -> StorageResult<Vec<StoredFilter>>;

    /// Load the persisted master record, if one was ever written.
    fn load_master(&self) -> StorageResult<Option<MasterSummary>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Commit write-through
    // ─────────────────────────────────────────────────────────────────────────

    /// Write (or overwrite) a filter blob.
    fn persist_filter(&self, id: FilterId, bytes: &[u8]) -> StorageResult<()>;

    /// Delete a filter blob. Deleting an absent id is not an error.
    fn remove_filter(&self, id: FilterId) -> StorageResult<()>;

    /// Write the master record.
    fn persist_master(&self, master: &MasterSummary) -> StorageResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Erase all filters and the master record.
    fn clear(&self) -> StorageResult<()>;
}
