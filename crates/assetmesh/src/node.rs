//! A node: filter store, dispatch engine and syncer behind one API.

use serde::{Deserialize, Serialize};
use tracing::info;

use assetmesh_core::{Advertisement, FilterId, MacAddress, MasterSummary};
use assetmesh_store::{
    commands, AssetFilterStore, CommandKind, CommitReport, FilterStorage, FilterSummaries,
    RemoveOutcome, StoreConfig, UploadProgress,
};
use assetmesh_sync::{AssetFilterSyncer, MeshMessage, NodeId, SyncAction, SyncStats, SyncerConfig};

use crate::engine::{DispatchEngine, ScanOutcome, ScanStats};
use crate::error::{NodeError, Result};
use crate::forwarder::AssetForwarder;

/// Configuration for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Mesh address.
    pub node_id: NodeId,
    /// This node's own BLE address.
    pub address: MacAddress,
    /// How often the service loop ticks the store and syncer.
    pub tick_interval_ms: u64,
    pub store: StoreConfig,
    pub sync: SyncerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId(0x0100),
            address: MacAddress([0; 6]),
            tick_interval_ms: 100,
            store: StoreConfig::default(),
            sync: SyncerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: NodeId, address: MacAddress) -> Self {
        Self {
            node_id,
            address,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_sync(mut self, sync: SyncerConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_tick_interval_ms(mut self, interval_ms: u64) -> Self {
        self.tick_interval_ms = interval_ms;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.store.staging_capacity == 0 || self.store.staging_capacity > u16::MAX as usize {
            return Err(NodeError::InvalidConfig(format!(
                "staging_capacity {} outside 1..=65535",
                self.store.staging_capacity
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(NodeError::InvalidConfig("tick_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}

/// One mesh node.
pub struct Node<S: FilterStorage> {
    config: NodeConfig,
    store: AssetFilterStore<S>,
    engine: DispatchEngine,
    syncer: AssetFilterSyncer,
}

impl<S: FilterStorage> Node<S> {
    /// Boot a node from persisted filters.
    pub fn open(storage: S, config: NodeConfig, now_ms: u64) -> Result<Self> {
        config.validate()?;
        let mut store = AssetFilterStore::open(storage, config.store.clone())?;
        store.tick(now_ms);
        let node = Self {
            engine: DispatchEngine::new(config.address),
            syncer: AssetFilterSyncer::new(config.node_id, config.sync.clone(), now_ms),
            store,
            config,
        };
        info!(node = %node.config.node_id, master = %node.store.master(), "node started");
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn store(&self) -> &AssetFilterStore<S> {
        &self.store
    }

    pub fn master(&self) -> MasterSummary {
        self.store.master()
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.syncer.stats()
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.engine.stats()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scan path
    // ─────────────────────────────────────────────────────────────────────────

    pub fn on_scan(&mut self, adv: &Advertisement<'_>, forwarder: &mut impl AssetForwarder) -> ScanOutcome {
        self.engine.dispatch(&self.store, adv, forwarder)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control channel
    // ─────────────────────────────────────────────────────────────────────────

    pub fn upload(
        &mut self,
        filter_id: FilterId,
        total_size: u16,
        chunk_size: u16,
        chunk_start: u16,
        data: &[u8],
    ) -> Result<UploadProgress> {
        Ok(self
            .store
            .upload(filter_id, total_size, chunk_size, chunk_start, data)?)
    }

    pub fn remove(&mut self, filter_id: FilterId) -> Result<RemoveOutcome> {
        Ok(self.store.remove(filter_id)?)
    }

    /// Commit staged changes; on success the syncer announces the new version.
    pub fn commit(&mut self, expected_version: u16, expected_crc: u16, now_ms: u64) -> Result<CommitReport> {
        let report = self.store.commit(expected_version, expected_crc)?;
        self.syncer.notify_committed(report.master, now_ms);
        Ok(report)
    }

    pub fn get_summaries(&self) -> FilterSummaries {
        self.store.get_summaries()
    }

    /// Execute an encoded control-channel command and return the encoded
    /// reply.
    pub fn handle_command(&mut self, kind: CommandKind, payload: &[u8], now_ms: u64) -> Result<Vec<u8>> {
        let before = self.store.master();
        let reply = commands::handle_command(&mut self.store, kind, payload)?;
        if self.store.master() != before {
            self.syncer.notify_committed(self.store.master(), now_ms);
        }
        Ok(reply)
    }

    pub fn factory_reset(&mut self) {
        self.store.factory_reset();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mesh
    // ─────────────────────────────────────────────────────────────────────────

    /// Advance time: expire idle uploads, then run scheduled sync work.
    pub fn tick(&mut self, now_ms: u64) -> Vec<SyncAction> {
        self.store.tick(now_ms);
        self.syncer.on_tick(&self.store, now_ms)
    }

    pub fn on_mesh_message(&mut self, from: NodeId, message: &MeshMessage, now_ms: u64) -> Vec<SyncAction> {
        self.syncer.handle_message(from, message, &self.store, now_ms)
    }

    /// A peer's version learned out of band (e.g. from a mesh beacon that
    /// carries no CRC).
    pub fn observe_peer(
        &mut self,
        peer: NodeId,
        master_version: u16,
        master_crc: Option<u16>,
        now_ms: u64,
    ) -> Vec<SyncAction> {
        self.syncer
            .observe_peer(peer, master_version, master_crc, &self.store, now_ms)
    }
}
