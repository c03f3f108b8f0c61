//! Error types for the store module.

use thiserror::Error;

use assetmesh_core::{CoreError, FilterId, MasterSummary};

/// Errors returned by the filter store's command surface.
///
/// All of these are reported synchronously to the caller and are never
/// retried internally.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Declared total size does not fit in the staging buffer.
    #[error("out of memory: upload of {requested} bytes exceeds staging capacity of {capacity}")]
    OutOfMemory { requested: usize, capacity: usize },

    /// A chunk did not continue the staged upload. The staged entry is gone.
    #[error("sequence error for filter {filter_id}: {fault}")]
    SequenceError {
        filter_id: FilterId,
        fault: SequenceFault,
    },

    /// A completed upload is not a valid filter blob.
    #[error("structural error in filter {filter_id}: {source}")]
    StructuralError {
        filter_id: FilterId,
        #[source]
        source: CoreError,
    },

    /// The commit would not produce the pair the caller expected.
    #[error("version conflict: expected {expected}, commit would produce {computed}")]
    VersionConflict {
        expected: MasterSummary,
        computed: MasterSummary,
    },

    /// Another filter's upload occupies the staging buffer.
    #[error("busy: filter {in_flight} is being uploaded, cannot stage filter {requested}")]
    Busy {
        in_flight: FilterId,
        requested: FilterId,
    },

    /// The committed set is full.
    #[error("too many filters: at most {max} can be committed")]
    TooManyFilters { max: usize },

    /// A command payload could not be decoded.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// A command carried an unknown protocol version.
    #[error("unsupported command protocol: {0}")]
    UnsupportedProtocol(u8),

    /// Persistent storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Why a chunk was rejected as out of sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceFault {
    #[error("chunk starts at {got}, expected {expected}")]
    UnexpectedOffset { expected: usize, got: usize },

    #[error("total size changed from {expected} to {got}")]
    TotalSizeChanged { expected: usize, got: usize },

    #[error("chunk ends at {end}, past total size {total}")]
    Overflow { end: usize, total: usize },
}

/// Errors from a persistent storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for storage backend operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
