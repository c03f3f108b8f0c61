//! # Assetmesh Sync
//!
//! Keeps the filter configuration consistent across a mesh of nodes without
//! ever shipping filter content between them.
//!
//! ## Overview
//!
//! Each node periodically broadcasts its committed `(masterVersion,
//! masterCrc)`. A node that sees a newer version asks the configuration
//! authority to re-sync it; the authority then drives the normal
//! upload/commit protocol. Equal versions with different CRCs are reported
//! as a divergence and left for an operator.
//!
//! ## Key Types
//!
//! - [`AssetFilterSyncer`] - Clock-driven gossip and re-sync state machine
//! - [`MeshMessage`] - CBOR-encoded mesh messages
//! - [`MeshTransport`] - Async transport trait, with [`MemoryMesh`] for tests
//!
//! ## Message Flow
//!
//! ```text
//! Node A (v4)                 Node B (v3)                Authority
//!   |---- Version(4, crc) ------>|                           |
//!   |                            |---- ResyncRequest(3) ---->|
//!   |                            |<--- upload/commit ---------|
//!   |<--- Version(4, crc) -------|                           |
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod syncer;
pub mod transport;

pub use convergence::{
    compare_message, compare_versions, verify_convergence, ConvergenceResult, VersionComparison,
};
pub use error::{Result, SyncError};
pub use messages::{limits, MeshMessage, NodeId, PROTOCOL_VERSION};
pub use syncer::{AssetFilterSyncer, LocalConfiguration, SyncAction, SyncStats, SyncerConfig};
pub use transport::{memory::MemoryMesh, memory::MemoryMeshTransport, MeshTransport};
