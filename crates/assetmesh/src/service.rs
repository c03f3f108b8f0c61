//! Async mesh service.
//!
//! Drives a [`Node`] from a tokio runtime: ticks it on an interval and feeds
//! it mesh messages from a [`MeshTransport`]. The node sits behind a
//! `std::sync::Mutex` shared with the scan and control-channel paths; the
//! lock is only taken for synchronous node calls and released before any
//! network I/O.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use assetmesh_store::FilterStorage;
use assetmesh_sync::{MeshTransport, SyncAction, SyncError};

use crate::error::{NodeError, Result};
use crate::node::Node;

/// Milliseconds since the service started.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
    offset_ms: u64,
}

impl MonotonicClock {
    /// A clock that reads `offset_ms` now.
    pub fn starting_at(offset_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            offset_ms,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.offset_ms + self.start.elapsed().as_millis() as u64
    }
}

/// Run the node's mesh loop until `shutdown` flips to true or the transport
/// closes.
pub async fn run_mesh_loop<S, T>(
    node: Arc<Mutex<Node<S>>>,
    transport: T,
    clock: MonotonicClock,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    S: FilterStorage,
    T: MeshTransport,
{
    let tick_ms = with_node(&node, |n| n.config().tick_interval_ms)?;
    let mut ticker = interval(Duration::from_millis(tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(node = %transport.local_node_id(), tick_ms, "mesh loop started");

    loop {
        let actions = tokio::select! {
            _ = ticker.tick() => {
                with_node(&node, |n| n.tick(clock.now_ms()))?
            }
            received = transport.recv() => match received {
                Ok((from, message)) => {
                    debug!(%from, ?message, "mesh message");
                    with_node(&node, |n| n.on_mesh_message(from, &message, clock.now_ms()))?
                }
                Err(SyncError::Codec(e)) | Err(SyncError::InvalidMessage(e)) => {
                    warn!(error = %e, "dropping undecodable mesh frame");
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(node = %transport.local_node_id(), "mesh loop stopped");
                    return Ok(());
                }
                Vec::new()
            }
        };

        for action in actions {
            perform(&transport, action).await;
        }
    }
}

/// Run `f` on the node with the lock held. Never spans an await.
fn with_node<S, R>(node: &Mutex<Node<S>>, f: impl FnOnce(&mut Node<S>) -> R) -> Result<R>
where
    S: FilterStorage,
{
    let mut guard = node.lock().map_err(|_| NodeError::LockPoisoned)?;
    Ok(f(&mut guard))
}

async fn perform<T: MeshTransport>(transport: &T, action: SyncAction) {
    let result = match action {
        SyncAction::Broadcast(message) => transport.broadcast(message).await,
        SyncAction::Send { to, message } => transport.send(&to, message).await,
    };
    // The mesh is lossy; the syncer retries on its own schedule.
    if let Err(e) = result {
        debug!(error = %e, "mesh send failed");
    }
}
