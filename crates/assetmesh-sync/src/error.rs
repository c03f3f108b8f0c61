//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during mesh sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Peer speaks a mesh protocol this node does not.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    /// A mesh message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Peer is not reachable on the mesh.
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
