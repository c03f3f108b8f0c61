//! The asset filter store and its update protocol.
//!
//! The committed set only ever changes inside [`AssetFilterStore::commit`],
//! and only when the caller's expected `(masterVersion, masterCrc)` equals the
//! pair the commit would produce. Everything before that (chunks, removals)
//! is staged, and staging is cleared whether the commit succeeds or not.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use assetmesh_core::{
    master_crc, next_version, AssetFilter, FilterId, FilterSummary, MasterSummary, NO_VERSION,
};

use crate::error::{Result, SequenceFault, StoreError};
use crate::staging::{ChunkProgress, StagedState, StagingBuffer};
use crate::traits::FilterStorage;

/// Configuration for the filter store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size of the single staging buffer, and so the largest filter blob.
    pub staging_capacity: usize,
    /// Most filters the committed set may hold.
    pub max_filters: usize,
    /// Staged changes are dropped after this long without a command.
    pub upload_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            staging_capacity: 512,
            max_filters: 8,
            upload_timeout_ms: 20_000,
        }
    }
}

impl StoreConfig {
    pub fn with_staging_capacity(mut self, bytes: usize) -> Self {
        self.staging_capacity = bytes;
        self
    }

    pub fn with_max_filters(mut self, max: usize) -> Self {
        self.max_filters = max;
        self
    }

    pub fn with_upload_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.upload_timeout_ms = timeout_ms;
        self
    }
}

/// Result of accepting an upload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProgress {
    /// More chunks are expected.
    Receiving { received: usize, total: usize },
    /// The upload is complete, valid, and eligible for the next commit.
    Complete { crc: u16 },
}

/// Result of a remove command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// A committed filter will be deleted at the next commit.
    Scheduled,
    /// Only a staged upload for the id existed; it was discarded.
    StagingDiscarded,
    /// Nothing known under this id.
    NoChange,
}

/// What a successful commit changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub master: MasterSummary,
    pub added: Option<FilterId>,
    pub removed: Vec<FilterId>,
}

/// Answer to a summaries query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummaries {
    pub master: MasterSummary,
    /// Largest blob the staging buffer accepts.
    pub staging_capacity: usize,
    /// One entry per committed filter, ascending by id.
    pub filters: Vec<FilterSummary>,
}

/// The filter store: committed set, staging, and the master pair.
pub struct AssetFilterStore<S: FilterStorage> {
    storage: S,
    config: StoreConfig,
    /// The committed set. Replaced wholesale by each commit.
    filters: BTreeMap<FilterId, AssetFilter>,
    master: MasterSummary,
    staging: StagingBuffer,
    pending_removals: BTreeSet<FilterId>,
    /// Time of the last upload/remove command while changes are staged.
    last_modification_ms: Option<u64>,
    now_ms: u64,
}

impl<S: FilterStorage> AssetFilterStore<S> {
    /// Open the store, loading the committed set from storage.
    ///
    /// Blobs that no longer parse are skipped. If the surviving filters do not
    /// reproduce the persisted master CRC, the master version drops to 0 so
    /// the node reports itself as unconfigured and gets re-synced.
    pub fn open(storage: S, config: StoreConfig) -> Result<Self> {
        let stored = storage.load_filters()?;
        let persisted = storage.load_master()?;

        let mut filters = BTreeMap::new();
        for record in stored {
            match AssetFilter::from_bytes(record.id, Bytes::from(record.bytes)) {
                Ok(filter) => {
                    filters.insert(record.id, filter);
                }
                Err(e) => warn!(filter_id = %record.id, error = %e, "skipping unreadable filter"),
            }
        }

        let crc = set_crc(&filters);
        let master = match persisted {
            Some(p) if p.crc == crc => MasterSummary::new(p.version, crc),
            Some(p) => {
                warn!(
                    persisted = %p,
                    computed_crc = crc,
                    "master crc mismatch at boot, discarding version"
                );
                MasterSummary::new(NO_VERSION, crc)
            }
            None => MasterSummary::new(NO_VERSION, crc),
        };

        info!(master = %master, filters = filters.len(), "filter store loaded");

        Ok(Self {
            storage,
            staging: StagingBuffer::new(config.staging_capacity),
            config,
            filters,
            master,
            pending_removals: BTreeSet::new(),
            last_modification_ms: None,
            now_ms: 0,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn master(&self) -> MasterSummary {
        self.master
    }

    pub fn master_version(&self) -> u16 {
        self.master.version
    }

    pub fn master_crc(&self) -> u16 {
        self.master.crc
    }

    /// Whether the committed set may be used for matching.
    pub fn is_ready(&self) -> bool {
        self.master.is_valid()
    }

    /// Whether an upload or a removal is staged.
    pub fn is_in_progress(&self) -> bool {
        self.staging.in_flight().is_some() || !self.pending_removals.is_empty()
    }

    /// Committed filters in ascending id order.
    pub fn filters(&self) -> impl Iterator<Item = &AssetFilter> {
        self.filters.values()
    }

    pub fn get(&self, id: FilterId) -> Option<&AssetFilter> {
        self.filters.get(&id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn get_summaries(&self) -> FilterSummaries {
        FilterSummaries {
            master: self.master,
            staging_capacity: self.staging.capacity(),
            filters: self.filters.values().map(AssetFilter::summary).collect(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Accept one chunk of a filter upload.
    ///
    /// The first chunk (`chunk_start == 0`, no staged entry for the id) leases
    /// the staging buffer. Every later chunk must start exactly where the
    /// previous one ended and repeat the same `total_size`; otherwise the
    /// staged entry is discarded and `SequenceError` is returned.
    ///
    /// The chunk that completes the buffer validates the blob. An invalid
    /// blob stays staged (so the following commit fails) and this call
    /// returns `StructuralError`.
    pub fn upload(
        &mut self,
        filter_id: FilterId,
        total_size: u16,
        chunk_size: u16,
        chunk_start: u16,
        data: &[u8],
    ) -> Result<UploadProgress> {
        if chunk_size as usize != data.len() {
            return Err(StoreError::MalformedCommand(format!(
                "chunk_size {} but {} data bytes",
                chunk_size,
                data.len()
            )));
        }
        let total_size = total_size as usize;
        let chunk_start = chunk_start as usize;

        match self.staging.in_flight() {
            Some(in_flight) if in_flight != filter_id => {
                return Err(StoreError::Busy {
                    in_flight,
                    requested: filter_id,
                });
            }
            Some(_) => {}
            None => self.begin_upload(filter_id, total_size, chunk_start)?,
        }

        let progress = self
            .staging
            .append(chunk_start, total_size, data)
            .map_err(|fault| {
                warn!(filter_id = %filter_id, %fault, "upload out of sequence, discarding");
                StoreError::SequenceError { filter_id, fault }
            })?;
        self.last_modification_ms = Some(self.now_ms);

        match progress {
            ChunkProgress::Partial { received, total } => {
                debug!(filter_id = %filter_id, received, total, "upload chunk accepted");
                Ok(UploadProgress::Receiving { received, total })
            }
            ChunkProgress::Complete { crc } => self.finish_upload(filter_id, crc),
        }
    }

    fn begin_upload(&mut self, filter_id: FilterId, total_size: usize, chunk_start: usize) -> Result<()> {
        if chunk_start != 0 {
            return Err(StoreError::SequenceError {
                filter_id,
                fault: SequenceFault::UnexpectedOffset {
                    expected: 0,
                    got: chunk_start,
                },
            });
        }
        if total_size == 0 {
            return Err(StoreError::MalformedCommand("empty filter upload".into()));
        }
        if total_size > self.staging.capacity() {
            return Err(StoreError::OutOfMemory {
                requested: total_size,
                capacity: self.staging.capacity(),
            });
        }

        let is_new = !self.filters.contains_key(&filter_id);
        let remaining = self
            .filters
            .keys()
            .filter(|id| !self.pending_removals.contains(id))
            .count();
        if is_new && remaining >= self.config.max_filters {
            return Err(StoreError::TooManyFilters {
                max: self.config.max_filters,
            });
        }

        debug!(filter_id = %filter_id, total_size, "upload started");
        self.staging.begin(filter_id, total_size);
        Ok(())
    }

    fn finish_upload(&mut self, filter_id: FilterId, crc: u16) -> Result<UploadProgress> {
        let bytes = Bytes::copy_from_slice(self.staging.contents());
        match AssetFilter::parse(filter_id, bytes, crc) {
            Ok(filter) => {
                debug!(filter_id = %filter_id, crc, "upload complete");
                self.staging.set_state(StagedState::Ready(filter));
                Ok(UploadProgress::Complete { crc })
            }
            Err(source) => {
                warn!(filter_id = %filter_id, error = %source, "uploaded filter is invalid");
                self.staging.set_state(StagedState::Invalid(source.clone()));
                Err(StoreError::StructuralError { filter_id, source })
            }
        }
    }

    /// Mark a filter for deletion at the next commit.
    ///
    /// A staged upload for the same id is discarded as well. Unknown ids are
    /// a no-op.
    pub fn remove(&mut self, filter_id: FilterId) -> Result<RemoveOutcome> {
        let discarded = self.staging.in_flight() == Some(filter_id);
        if discarded {
            self.staging.discard();
        }

        let outcome = if self.filters.contains_key(&filter_id) {
            self.pending_removals.insert(filter_id);
            RemoveOutcome::Scheduled
        } else if discarded {
            RemoveOutcome::StagingDiscarded
        } else {
            RemoveOutcome::NoChange
        };

        if outcome != RemoveOutcome::NoChange {
            self.last_modification_ms = Some(self.now_ms);
        }
        debug!(filter_id = %filter_id, ?outcome, "remove");
        Ok(outcome)
    }

    /// Apply staged changes if they produce the expected master pair.
    ///
    /// Removals are applied first, then the staged upload if it is complete
    /// and valid (an incomplete one is dropped). On success the new set is
    /// swapped in and written through to storage; on any failure the committed
    /// set is untouched. Staging is cleared in both cases.
    pub fn commit(&mut self, expected_version: u16, expected_crc: u16) -> Result<CommitReport> {
        let expected = MasterSummary::new(expected_version, expected_crc);
        let staged = self.staging.take();
        let removals = mem::take(&mut self.pending_removals);
        self.last_modification_ms = None;

        let mut next = self.filters.clone();
        let mut removed = Vec::new();
        for id in removals {
            if next.remove(&id).is_some() {
                removed.push(id);
            }
        }

        let mut added = None;
        match staged {
            Some((filter_id, StagedState::Invalid(source))) => {
                warn!(filter_id = %filter_id, "commit rejected: staged filter is invalid");
                return Err(StoreError::StructuralError { filter_id, source });
            }
            Some((filter_id, StagedState::Ready(filter))) => {
                next.insert(filter_id, filter);
                added = Some(filter_id);
            }
            Some((filter_id, StagedState::Receiving)) => {
                warn!(filter_id = %filter_id, "dropping incomplete upload at commit");
            }
            None => {}
        }

        let computed = MasterSummary::new(next_version(self.master.version), set_crc(&next));
        if computed != expected {
            warn!(expected = %expected, computed = %computed, "commit rejected: version conflict");
            return Err(StoreError::VersionConflict { expected, computed });
        }

        self.write_through(&next, added, &removed, computed);
        self.filters = next;
        self.master = computed;
        info!(master = %computed, ?added, ?removed, "filter changes committed");

        Ok(CommitReport {
            master: computed,
            added,
            removed,
        })
    }

    /// Advance the store's clock and expire idle staged changes.
    ///
    /// Returns true if staged changes were dropped.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        self.now_ms = now_ms;
        let Some(since) = self.last_modification_ms else {
            return false;
        };
        if now_ms.saturating_sub(since) < self.config.upload_timeout_ms {
            return false;
        }

        let dropped_upload = self.staging.discard();
        let dropped_removals = mem::take(&mut self.pending_removals);
        self.last_modification_ms = None;
        warn!(
            upload = ?dropped_upload,
            removals = ?dropped_removals,
            "staged filter changes timed out"
        );
        true
    }

    /// Drop every filter and all staged changes. Version returns to 0.
    pub fn factory_reset(&mut self) {
        if let Err(e) = self.storage.clear() {
            error!(error = %e, "failed to clear filter storage");
        }
        self.staging.discard();
        self.pending_removals.clear();
        self.last_modification_ms = None;
        self.filters.clear();
        self.master = MasterSummary::new(NO_VERSION, set_crc(&self.filters));
        info!("filter store reset");
    }

    /// Persist a successful commit. Failures are logged, never retried.
    fn write_through(
        &self,
        next: &BTreeMap<FilterId, AssetFilter>,
        added: Option<FilterId>,
        removed: &[FilterId],
        master: MasterSummary,
    ) {
        for &id in removed {
            if let Err(e) = self.storage.remove_filter(id) {
                error!(filter_id = %id, error = %e, "failed to remove filter from storage");
            }
        }
        if let Some(filter) = added.and_then(|id| next.get(&id)) {
            if let Err(e) = self.storage.persist_filter(filter.id(), filter.as_bytes()) {
                error!(filter_id = %filter.id(), error = %e, "failed to persist filter");
            }
        }
        if let Err(e) = self.storage.persist_master(&master) {
            error!(master = %master, error = %e, "failed to persist master record");
        }
    }
}

fn set_crc(filters: &BTreeMap<FilterId, AssetFilter>) -> u16 {
    master_crc(filters.values().map(|f| (f.id(), f.crc())))
}
