//! Error types for a node.

use assetmesh_store::{StorageError, StoreError};
use assetmesh_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Filter store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Mesh sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The shared node state was poisoned by a panic.
    #[error("node lock poisoned")]
    LockPoisoned,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
