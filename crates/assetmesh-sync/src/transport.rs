//! Mesh transport abstraction.
//!
//! The transport delivers [`MeshMessage`]s between nodes. Implementations
//! sit on top of a BLE mesh stack on device, or on channels in tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::messages::{MeshMessage, NodeId};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sending and receiving mesh messages.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Send a message to a specific node.
    async fn send(&self, peer: &NodeId, message: MeshMessage) -> Result<()>;

    /// Send a message to every other node.
    async fn broadcast(&self, message: MeshMessage) -> Result<()>;

    /// Receive the next message from any node. Waits until one arrives.
    async fn recv(&self) -> Result<(NodeId, MeshMessage)>;

    /// Receive with timeout. Returns None if nothing arrived in time.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(NodeId, MeshMessage)>>;

    /// The local node's mesh address.
    fn local_node_id(&self) -> NodeId;
}

/// An in-memory mesh for testing.
///
/// Messages are CBOR-encoded on send and decoded on receive, so the wire
/// codec is exercised end to end.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::sync::{mpsc, Mutex, RwLock};
    use tracing::debug;

    #[derive(Debug, Clone)]
    struct Frame {
        from: NodeId,
        payload: Bytes,
    }

    /// Shared state of the simulated mesh.
    #[derive(Default)]
    pub struct MemoryMesh {
        senders: RwLock<HashMap<NodeId, mpsc::Sender<Frame>>>,
        /// Nodes currently cut off from the mesh.
        partitioned: RwLock<HashSet<NodeId>>,
    }

    impl MemoryMesh {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport for `node_id` attached to this mesh.
        pub async fn join(self: &Arc<Self>, node_id: NodeId) -> MemoryMeshTransport {
            let (tx, rx) = mpsc::channel(256);
            self.senders.write().await.insert(node_id, tx);
            MemoryMeshTransport {
                node_id,
                mesh: Arc::clone(self),
                receiver: Mutex::new(rx),
            }
        }

        /// Cut a node off: nothing it sends or is sent gets delivered.
        pub async fn partition(&self, node_id: NodeId) {
            self.partitioned.write().await.insert(node_id);
        }

        /// Reconnect a partitioned node.
        pub async fn heal(&self, node_id: NodeId) {
            self.partitioned.write().await.remove(&node_id);
        }

        async fn deliver(&self, from: NodeId, to: NodeId, payload: Bytes) -> Result<()> {
            let partitioned = self.partitioned.read().await;
            if partitioned.contains(&from) || partitioned.contains(&to) {
                debug!(%from, %to, "frame dropped by partition");
                return Ok(());
            }
            let senders = self.senders.read().await;
            let sender = senders
                .get(&to)
                .ok_or_else(|| SyncError::PeerNotConnected(to.to_string()))?;
            sender
                .send(Frame { from, payload })
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryMeshTransport {
        node_id: NodeId,
        mesh: Arc<MemoryMesh>,
        receiver: Mutex<mpsc::Receiver<Frame>>,
    }

    impl MemoryMeshTransport {
        pub fn mesh(&self) -> &Arc<MemoryMesh> {
            &self.mesh
        }
    }

    #[async_trait]
    impl MeshTransport for MemoryMeshTransport {
        async fn send(&self, peer: &NodeId, message: MeshMessage) -> Result<()> {
            let payload = Bytes::from(message.encode()?);
            self.mesh.deliver(self.node_id, *peer, payload).await
        }

        async fn broadcast(&self, message: MeshMessage) -> Result<()> {
            let payload = Bytes::from(message.encode()?);
            let peers: Vec<NodeId> = self
                .mesh
                .senders
                .read()
                .await
                .keys()
                .filter(|id| **id != self.node_id)
                .copied()
                .collect();
            for peer in peers {
                // Some peers may have left the mesh.
                let _ = self.mesh.deliver(self.node_id, peer, payload.clone()).await;
            }
            Ok(())
        }

        async fn recv(&self) -> Result<(NodeId, MeshMessage)> {
            let mut rx = self.receiver.lock().await;
            match rx.recv().await {
                Some(frame) => Ok((frame.from, MeshMessage::decode(&frame.payload)?)),
                None => Err(SyncError::TransportError("channel closed".into())),
            }
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(NodeId, MeshMessage)>> {
            let mut rx = self.receiver.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(frame)) => Ok(Some((frame.from, MeshMessage::decode(&frame.payload)?))),
                Ok(None) => Err(SyncError::TransportError("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        fn local_node_id(&self) -> NodeId {
            self.node_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryMesh;
    use super::*;
    use assetmesh_core::MasterSummary;

    #[tokio::test]
    async fn test_send_recv() {
        let mesh = MemoryMesh::new();
        let a = mesh.join(NodeId(0xA)).await;
        let b = mesh.join(NodeId(0xB)).await;

        let msg = MeshMessage::resync_request(NodeId(0xA), MasterSummary::new(1, 2));
        a.send(&NodeId(0xB), msg.clone()).await.unwrap();

        let (from, received) = b.recv().await.unwrap();
        assert_eq!(from, NodeId(0xA));
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_others() {
        let mesh = MemoryMesh::new();
        let a = mesh.join(NodeId(0xA)).await;
        let b = mesh.join(NodeId(0xB)).await;
        let c = mesh.join(NodeId(0xC)).await;

        a.broadcast(MeshMessage::version(MasterSummary::new(3, 3)))
            .await
            .unwrap();

        assert_eq!(b.recv().await.unwrap().0, NodeId(0xA));
        assert_eq!(c.recv().await.unwrap().0, NodeId(0xA));
        assert!(a
            .recv_timeout(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let mesh = MemoryMesh::new();
        let a = mesh.join(NodeId(0xA)).await;
        let err = a
            .send(&NodeId(0xF), MeshMessage::version(MasterSummary::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PeerNotConnected(_)));
    }

    #[tokio::test]
    async fn test_partition_drops_frames() {
        let mesh = MemoryMesh::new();
        let a = mesh.join(NodeId(0xA)).await;
        let b = mesh.join(NodeId(0xB)).await;

        mesh.partition(NodeId(0xB)).await;
        a.broadcast(MeshMessage::version(MasterSummary::new(1, 1)))
            .await
            .unwrap();
        assert!(b
            .recv_timeout(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());

        mesh.heal(NodeId(0xB)).await;
        a.broadcast(MeshMessage::version(MasterSummary::new(1, 1)))
            .await
            .unwrap();
        assert!(b
            .recv_timeout(Duration::from_millis(100))
            .await
            .unwrap()
            .is_some());
    }
}
