//! # Assetmesh
//!
//! Asset filtering for BLE mesh nodes.
//!
//! Each node scans advertisements and runs them through a small set of
//! configured filters (cuckoo or exact-match). Matches are forwarded as MAC
//! addresses or short asset ids. A configuration authority installs filters
//! with a chunked upload followed by a compare-and-set commit, and nodes
//! gossip their `(masterVersion, masterCrc)` so stragglers ask to be re-synced.
//!
//! ## Overview
//!
//! This crate ties together:
//!
//! - [`assetmesh_core`]: filter formats, hashing, version arithmetic
//! - [`assetmesh_store`]: the filter store and its update protocol
//! - [`assetmesh_sync`]: version gossip and re-sync requests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use assetmesh::{CollectingForwarder, Node, NodeConfig};
//! use assetmesh_core::{Advertisement, MacAddress};
//! use assetmesh_store::SqliteStorage;
//! use assetmesh_sync::NodeId;
//!
//! let storage = SqliteStorage::open("node.db").unwrap();
//! let config = NodeConfig::new(NodeId(0x0042), MacAddress([0x02, 0, 0, 0, 0, 0x42]));
//! let mut node = Node::open(storage, config, 0).unwrap();
//!
//! let data = [0x02, 0x01, 0x06];
//! let adv = Advertisement::new(MacAddress([0xC0, 0xFF, 0, 0, 0, 1]), -70, &data);
//! let mut forwarder = CollectingForwarder::new();
//! let outcome = node.on_scan(&adv, &mut forwarder);
//! println!("{:?}", outcome);
//! ```

pub mod engine;
pub mod error;
pub mod forwarder;
pub mod node;
pub mod service;

pub use engine::{DispatchEngine, ScanOutcome, ScanStats};
pub use error::{NodeError, Result};
pub use forwarder::{AssetForwarder, AssetMatch, CollectingForwarder};
pub use node::{Node, NodeConfig};
pub use service::{run_mesh_loop, MonotonicClock};

// Re-export the pieces most callers need.
pub use assetmesh_core::{
    Advertisement, AssetFilter, AssetId, FilterId, MacAddress, MasterSummary, OutputKey,
};
pub use assetmesh_store::{
    AssetFilterStore, CommandKind, FilterStorage, MemoryStorage, SqliteStorage, StoreConfig,
};
pub use assetmesh_sync::{MeshMessage, MeshTransport, NodeId, SyncerConfig};
