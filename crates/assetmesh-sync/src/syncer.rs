//! The asset filter syncer.
//!
//! A clock-driven state machine. It never touches the network itself: every
//! call returns the [`SyncAction`]s the caller should perform, so it can be
//! driven from a firmware timer, a tokio loop, or a test.
//!
//! ```text
//! tick ──► broadcast due? ──► Broadcast(Version)
//!      └─► newest peer ahead? ──► backoff elapsed? ──► Send(authority, ResyncRequest)
//! peer Version ──► Diverged  ──► log, count
//!              └─► PeerOlder ──► open fast broadcast window
//!              └─► PeerNewer ──► re-sync (same backoff gate)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use assetmesh_core::{is_newer, MasterSummary};
use assetmesh_store::{AssetFilterStore, FilterStorage};

use crate::convergence::{compare_message, compare_versions, VersionComparison};
use crate::messages::{MeshMessage, NodeId};

/// What the syncer needs to know about the local store.
pub trait LocalConfiguration {
    /// The committed `(masterVersion, masterCrc)`.
    fn master(&self) -> MasterSummary;

    /// Whether an update is staged but not committed.
    fn is_in_progress(&self) -> bool;
}

impl<S: FilterStorage> LocalConfiguration for AssetFilterStore<S> {
    fn master(&self) -> MasterSummary {
        AssetFilterStore::master(self)
    }

    fn is_in_progress(&self) -> bool {
        AssetFilterStore::is_in_progress(self)
    }
}

impl LocalConfiguration for (MasterSummary, bool) {
    fn master(&self) -> MasterSummary {
        self.0
    }

    fn is_in_progress(&self) -> bool {
        self.1
    }
}

/// Syncer timing and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    /// Node that receives re-sync requests.
    pub authority: NodeId,
    /// Normal interval between version broadcasts.
    pub broadcast_interval_ms: u64,
    /// Interval between broadcasts inside a fast window.
    pub fast_broadcast_interval_ms: u64,
    /// Length of a fast window.
    pub fast_broadcast_window_ms: u64,
    pub resync_backoff_initial_ms: u64,
    pub resync_backoff_max_ms: u64,
    /// Peers not heard from for this long are forgotten.
    pub peer_ttl_ms: u64,
    pub max_tracked_peers: usize,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            authority: NodeId(0x0001),
            broadcast_interval_ms: 300_000,
            fast_broadcast_interval_ms: 1_000,
            fast_broadcast_window_ms: 60_000,
            resync_backoff_initial_ms: 10_000,
            resync_backoff_max_ms: 600_000,
            peer_ttl_ms: 900_000,
            max_tracked_peers: 16,
        }
    }
}

impl SyncerConfig {
    pub fn with_authority(mut self, authority: NodeId) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_broadcast_interval_ms(mut self, interval_ms: u64) -> Self {
        self.broadcast_interval_ms = interval_ms;
        self
    }

    pub fn with_fast_window(mut self, interval_ms: u64, window_ms: u64) -> Self {
        self.fast_broadcast_interval_ms = interval_ms;
        self.fast_broadcast_window_ms = window_ms;
        self
    }

    pub fn with_resync_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.resync_backoff_initial_ms = initial_ms;
        self.resync_backoff_max_ms = max_ms;
        self
    }

    pub fn with_peer_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.peer_ttl_ms = ttl_ms;
        self
    }

    pub fn with_max_tracked_peers(mut self, max: usize) -> Self {
        self.max_tracked_peers = max;
        self
    }
}

/// Something the caller should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Broadcast(MeshMessage),
    Send { to: NodeId, message: MeshMessage },
}

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub broadcasts: u64,
    pub resync_requests: u64,
    pub divergences: u64,
    /// Broadcasts or re-syncs skipped because an update was in progress.
    pub suppressed: u64,
}

#[derive(Debug, Clone, Copy)]
struct PeerRecord {
    version: u16,
    crc: Option<u16>,
    seen_ms: u64,
}

/// Version gossip and re-sync state for one node.
#[derive(Debug)]
pub struct AssetFilterSyncer {
    node_id: NodeId,
    config: SyncerConfig,
    peers: HashMap<NodeId, PeerRecord>,
    next_broadcast_ms: u64,
    fast_until_ms: u64,
    backoff_ms: u64,
    next_resync_ms: u64,
    stats: SyncStats,
}

impl AssetFilterSyncer {
    /// Create a syncer at boot. The first broadcast is due immediately and a
    /// fast window is open.
    pub fn new(node_id: NodeId, config: SyncerConfig, now_ms: u64) -> Self {
        Self {
            node_id,
            peers: HashMap::new(),
            next_broadcast_ms: now_ms,
            fast_until_ms: now_ms + config.fast_broadcast_window_ms,
            backoff_ms: config.resync_backoff_initial_ms,
            next_resync_ms: now_ms,
            stats: SyncStats::default(),
            config,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn tracked_peers(&self) -> usize {
        self.peers.len()
    }

    /// Current re-sync backoff.
    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    /// Scheduled work: version broadcast and the periodic peer check.
    pub fn on_tick(&mut self, local: &impl LocalConfiguration, now_ms: u64) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        self.expire_peers(now_ms);

        if now_ms >= self.next_broadcast_ms {
            if local.is_in_progress() {
                self.stats.suppressed += 1;
                debug!(node = %self.node_id, "broadcast suppressed, update in progress");
            } else {
                self.stats.broadcasts += 1;
                actions.push(SyncAction::Broadcast(MeshMessage::version(local.master())));
            }
            self.next_broadcast_ms = now_ms + self.broadcast_interval(now_ms);
        }

        if self.behind_newest_peer(local.master()) {
            actions.extend(self.request_resync(local, now_ms));
        } else {
            self.caught_up();
        }
        actions
    }

    /// Record a peer's reported configuration and react to it.
    pub fn observe_peer(
        &mut self,
        peer: NodeId,
        master_version: u16,
        master_crc: Option<u16>,
        local: &impl LocalConfiguration,
        now_ms: u64,
    ) -> Vec<SyncAction> {
        if peer == self.node_id {
            return Vec::new();
        }
        self.record_peer(peer, master_version, master_crc, now_ms);
        let comparison = compare_versions(local.master(), master_version, master_crc);
        self.react(peer, comparison, local, now_ms)
    }

    /// Handle a decoded mesh message from `from`.
    pub fn handle_message(
        &mut self,
        from: NodeId,
        message: &MeshMessage,
        local: &impl LocalConfiguration,
        now_ms: u64,
    ) -> Vec<SyncAction> {
        let comparison = compare_message(local.master(), message);
        if let VersionComparison::UnknownProtocol(protocol) = comparison {
            debug!(peer = %from, protocol, "ignoring message with unknown protocol");
            return Vec::new();
        }

        if let MeshMessage::ResyncRequest { node, .. } = message {
            if self.node_id == self.config.authority {
                info!(peer = %node, master = %message.master(), "re-sync requested");
            }
        }

        let master = message.master();
        self.observe_peer(from, master.version, Some(master.crc), local, now_ms)
    }

    /// A local commit succeeded: announce it quickly.
    pub fn notify_committed(&mut self, master: MasterSummary, now_ms: u64) {
        debug!(node = %self.node_id, master = %master, "local commit, opening fast window");
        self.open_fast_window(now_ms);
        if !self.behind_newest_peer(master) {
            self.caught_up();
        }
    }

    fn react(
        &mut self,
        peer: NodeId,
        comparison: VersionComparison,
        local: &impl LocalConfiguration,
        now_ms: u64,
    ) -> Vec<SyncAction> {
        match comparison {
            VersionComparison::Equal => {
                // Another tracked peer may still be ahead; keep the backoff then.
                if !self.behind_newest_peer(local.master()) {
                    self.caught_up();
                }
                Vec::new()
            }
            VersionComparison::PeerOlder => {
                debug!(peer = %peer, "peer is behind, broadcasting sooner");
                self.open_fast_window(now_ms);
                Vec::new()
            }
            VersionComparison::PeerNewer => self.request_resync(local, now_ms),
            VersionComparison::Diverged {
                local_crc,
                peer_crc,
            } => {
                self.stats.divergences += 1;
                warn!(
                    peer = %peer,
                    version = local.master().version,
                    local_crc,
                    peer_crc,
                    "filter configuration diverged"
                );
                Vec::new()
            }
            VersionComparison::UnknownProtocol(_) => Vec::new(),
        }
    }

    fn request_resync(&mut self, local: &impl LocalConfiguration, now_ms: u64) -> Vec<SyncAction> {
        if local.is_in_progress() {
            self.stats.suppressed += 1;
            debug!(node = %self.node_id, "re-sync suppressed, update in progress");
            return Vec::new();
        }
        if now_ms < self.next_resync_ms || self.node_id == self.config.authority {
            return Vec::new();
        }

        self.stats.resync_requests += 1;
        self.next_resync_ms = now_ms + self.backoff_ms;
        self.backoff_ms = (self.backoff_ms * 2).min(self.config.resync_backoff_max_ms);
        info!(
            node = %self.node_id,
            authority = %self.config.authority,
            master = %local.master(),
            next_backoff_ms = self.backoff_ms,
            "behind the mesh, requesting re-sync"
        );

        vec![SyncAction::Send {
            to: self.config.authority,
            message: MeshMessage::resync_request(self.node_id, local.master()),
        }]
    }

    fn caught_up(&mut self) {
        self.backoff_ms = self.config.resync_backoff_initial_ms;
        self.next_resync_ms = 0;
    }

    fn open_fast_window(&mut self, now_ms: u64) {
        self.fast_until_ms = now_ms + self.config.fast_broadcast_window_ms;
        self.next_broadcast_ms = self.next_broadcast_ms.min(now_ms);
    }

    fn broadcast_interval(&self, now_ms: u64) -> u64 {
        if now_ms < self.fast_until_ms {
            self.config.fast_broadcast_interval_ms
        } else {
            self.config.broadcast_interval_ms
        }
    }

    fn record_peer(&mut self, peer: NodeId, version: u16, crc: Option<u16>, now_ms: u64) {
        if !self.peers.contains_key(&peer) && self.peers.len() >= self.config.max_tracked_peers {
            let oldest = self
                .peers
                .iter()
                .min_by_key(|(_, record)| record.seen_ms)
                .map(|(&id, _)| id);
            if let Some(oldest) = oldest {
                self.peers.remove(&oldest);
            }
        }
        if self.config.max_tracked_peers == 0 {
            return;
        }
        self.peers.insert(
            peer,
            PeerRecord {
                version,
                crc,
                seen_ms: now_ms,
            },
        );
    }

    fn expire_peers(&mut self, now_ms: u64) {
        let ttl = self.config.peer_ttl_ms;
        self.peers
            .retain(|_, record| now_ms.saturating_sub(record.seen_ms) < ttl);
    }

    fn behind_newest_peer(&self, local: MasterSummary) -> bool {
        self.newest_peer().is_some_and(|peer| {
            compare_versions(local, peer.version, peer.crc).local_is_behind()
        })
    }

    fn newest_peer(&self) -> Option<PeerRecord> {
        self.peers.values().copied().reduce(|best, record| {
            if is_newer(record.version, best.version) {
                record
            } else {
                best
            }
        })
    }
}
