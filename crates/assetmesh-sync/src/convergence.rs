//! Version comparison between a node and its peers.
//!
//! Versions are ordered with serial number arithmetic so the comparison
//! survives the `0xFFFF -> 1` wrap. Equal versions with different CRCs are a
//! divergence: two commits were accepted under the same version somewhere in
//! the mesh. Divergence is reported, never healed automatically.

use assetmesh_core::{is_newer, MasterSummary};

use crate::messages::{MeshMessage, PROTOCOL_VERSION};

/// How a peer's configuration relates to ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComparison {
    /// Same version, and the same CRC where the peer reported one.
    Equal,
    /// The peer is behind us.
    PeerOlder,
    /// The peer is ahead of us.
    PeerNewer,
    /// Same version, different CRC.
    Diverged { local_crc: u16, peer_crc: u16 },
    /// The peer speaks an unknown mesh protocol. Ignored.
    UnknownProtocol(u8),
}

impl VersionComparison {
    /// Whether the local node should ask the authority for a re-sync.
    pub fn local_is_behind(&self) -> bool {
        matches!(self, Self::PeerNewer)
    }
}

/// Compare the local configuration with a peer's reported one.
pub fn compare_versions(
    local: MasterSummary,
    peer_version: u16,
    peer_crc: Option<u16>,
) -> VersionComparison {
    if is_newer(peer_version, local.version) {
        return VersionComparison::PeerNewer;
    }
    if is_newer(local.version, peer_version) {
        return VersionComparison::PeerOlder;
    }
    match peer_crc {
        // Two unconfigured nodes have nothing to disagree about.
        Some(peer_crc) if peer_crc != local.crc && local.is_valid() => {
            VersionComparison::Diverged {
                local_crc: local.crc,
                peer_crc,
            }
        }
        _ => VersionComparison::Equal,
    }
}

/// Compare the local configuration with the one carried by a mesh message.
pub fn compare_message(local: MasterSummary, message: &MeshMessage) -> VersionComparison {
    if message.protocol() != PROTOCOL_VERSION {
        return VersionComparison::UnknownProtocol(message.protocol());
    }
    let peer = message.master();
    compare_versions(local, peer.version, Some(peer.crc))
}

/// Result of checking a group of nodes for agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Every node holds the same configuration.
    Converged(MasterSummary),
    /// Nodes disagree on the version; the newest is given.
    NotConverged { newest: MasterSummary },
    /// Two nodes hold different sets under the same version.
    Diverged { version: u16, crcs: Vec<u16> },
}

/// Check whether a set of node summaries has converged.
pub fn verify_convergence(summaries: &[MasterSummary]) -> ConvergenceResult {
    let Some(&first) = summaries.first() else {
        return ConvergenceResult::Converged(MasterSummary::default());
    };

    let newest = summaries
        .iter()
        .copied()
        .fold(first, |best, s| if is_newer(s.version, best.version) { s } else { best });

    let mut crcs: Vec<u16> = summaries
        .iter()
        .filter(|s| s.version == newest.version)
        .map(|s| s.crc)
        .collect();
    crcs.sort_unstable();
    crcs.dedup();
    if crcs.len() > 1 {
        return ConvergenceResult::Diverged {
            version: newest.version,
            crcs,
        };
    }

    if summaries.iter().all(|s| s.version == newest.version) {
        ConvergenceResult::Converged(newest)
    } else {
        ConvergenceResult::NotConverged { newest }
    }
}
