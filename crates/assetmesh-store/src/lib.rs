//! # Assetmesh Store
//!
//! The node-side filter store: the committed set of asset filters, the single
//! staging buffer, and the chunked upload / remove / commit protocol that
//! changes the set atomically.
//!
//! ## Key Types
//!
//! - [`AssetFilterStore`] - Committed set, staging, master version and CRC
//! - [`FilterStorage`] - Trait for flash persistence of committed filters
//! - [`SqliteStorage`] - SQLite-backed persistence
//! - [`MemoryStorage`] - In-memory persistence for tests
//! - [`FilterCommand`] - Decoded control-channel command
//!
//! ## Usage
//!
//! ```rust,no_run
//! use assetmesh_store::{AssetFilterStore, SqliteStorage, StoreConfig};
//!
//! let storage = SqliteStorage::open("filters.db").unwrap();
//! let store = AssetFilterStore::open(storage, StoreConfig::default()).unwrap();
//!
//! // A controller uploads a blob in chunks, then commits with the pair it
//! // expects the node to end up with.
//! // store.upload(FilterId(3), 100, 50, 0, &blob[..50])?;
//! // store.upload(FilterId(3), 100, 50, 50, &blob[50..])?;
//! // store.commit(1, expected_crc)?;
//! println!("{}", store.master());
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic commits**: the committed set is replaced wholesale or not at all
//! - **Compare-and-set**: commit succeeds only on the expected `(version, crc)`
//! - **Write-through**: persistence failures are logged and never retried
//! - **Boot check**: a master CRC that no longer matches resets the version to 0

pub mod commands;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod staging;
pub mod store;
pub mod traits;

pub use commands::{
    decode_summaries, encode_summaries, handle_command, CommandKind, FilterCommand,
    COMMAND_PROTOCOL_VERSION,
};
pub use error::{Result, SequenceFault, StorageError, StorageResult, StoreError};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use store::{
    AssetFilterStore, CommitReport, FilterSummaries, RemoveOutcome, StoreConfig, UploadProgress,
};
pub use traits::{FilterStorage, StoredFilter};
