//! Mesh message types.
//!
//! Nodes gossip their `(masterVersion, masterCrc)` and ask the configuration
//! authority for a re-sync when they fall behind. Filter content is never sent
//! between nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use assetmesh_core::MasterSummary;

use crate::error::{Result, SyncError};

/// A node's mesh address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl NodeId {
    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }

    /// A random unicast address (`0x0001..=0x7FFF`).
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen_range(0x0001..=0x7FFF))
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:04x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// Current mesh protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message size limits.
pub mod limits {
    /// Largest encoded mesh message accepted.
    pub const MAX_MESSAGE_SIZE: usize = 64;
}

/// Mesh sync messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshMessage {
    /// Periodic advertisement of the sender's committed configuration.
    Version {
        protocol: u8,
        master_version: u16,
        master_crc: u16,
    },

    /// Sent to the configuration authority by a node that is behind.
    ResyncRequest {
        protocol: u8,
        node: NodeId,
        master_version: u16,
        master_crc: u16,
    },
}

impl MeshMessage {
    pub fn version(master: MasterSummary) -> Self {
        Self::Version {
            protocol: PROTOCOL_VERSION,
            master_version: master.version,
            master_crc: master.crc,
        }
    }

    pub fn resync_request(node: NodeId, master: MasterSummary) -> Self {
        Self::ResyncRequest {
            protocol: PROTOCOL_VERSION,
            node,
            master_version: master.version,
            master_crc: master.crc,
        }
    }

    pub fn protocol(&self) -> u8 {
        match self {
            Self::Version { protocol, .. } | Self::ResyncRequest { protocol, .. } => *protocol,
        }
    }

    /// The sender's configuration as carried by the message.
    pub fn master(&self) -> MasterSummary {
        match *self {
            Self::Version {
                master_version,
                master_crc,
                ..
            }
            | Self::ResyncRequest {
                master_version,
                master_crc,
                ..
            } => MasterSummary::new(master_version, master_crc),
        }
    }

    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
        if buf.len() > limits::MAX_MESSAGE_SIZE {
            return Err(SyncError::InvalidMessage(format!(
                "encoded message is {} bytes",
                buf.len()
            )));
        }
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > limits::MAX_MESSAGE_SIZE {
            return Err(SyncError::InvalidMessage(format!(
                "message of {} bytes exceeds limit",
                bytes.len()
            )));
        }
        ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cbor_roundtrip() {
        let msg = MeshMessage::resync_request(NodeId(0x0102), MasterSummary::new(9, 0xBEEF));
        let bytes = msg.encode().unwrap();
        assert!(bytes.len() <= limits::MAX_MESSAGE_SIZE);
        assert_eq!(MeshMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_master_accessor() {
        let msg = MeshMessage::version(MasterSummary::new(3, 0x0A0B));
        assert_eq!(msg.protocol(), PROTOCOL_VERSION);
        assert_eq!(msg.master(), MasterSummary::new(3, 0x0A0B));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(MeshMessage::decode(&[0xFF, 0x00]), Err(SyncError::Codec(_))));
        assert!(matches!(
            MeshMessage::decode(&[0u8; 65]),
            Err(SyncError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_random_node_is_unicast() {
        for _ in 0..32 {
            let id = NodeId::random();
            assert!((0x0001..=0x7FFF).contains(&id.get()));
        }
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(0x00AB).to_string(), "00ab");
        assert_eq!(format!("{:?}", NodeId(1)), "NodeId(0001)");
    }
}
