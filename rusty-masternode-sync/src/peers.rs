//! Peer handles and snapshots of the connected peer set.
//!
//! The connection list belongs to the connection manager. Sync code never
//! iterates it under the lock: it takes a [`PeerSnapshot`], a reference
//! counted copy of the list, and drops it when done.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use log::{debug, trace};
use rusty_shared_types::P2PMessage;

/// What the sync logic needs from a connected peer.
pub trait PeerHandle: Send + Sync {
    fn id(&self) -> u64;
    fn addr(&self) -> SocketAddr;
    fn protocol_version(&self) -> u32;
    /// Outbound connection we opened to a masternode for masternode duties.
    fn is_masternode_connection(&self) -> bool;
    fn is_inbound(&self) -> bool;
    fn send(&self, message: P2PMessage);
    /// Ask the connection manager to drop this peer. Nothing else about the
    /// peer is ever mutated by sync code.
    fn request_disconnect(&self);
    fn disconnect_requested(&self) -> bool;
}

/// Reference counted copy of the connected peer list.
#[derive(Clone, Default)]
pub struct PeerSnapshot {
    peers: Vec<Arc<dyn PeerHandle>>,
}

impl PeerSnapshot {
    pub fn new(peers: Vec<Arc<dyn PeerHandle>>) -> Self {
        Self { peers }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PeerHandle>> {
        self.peers.iter()
    }
}

impl Drop for PeerSnapshot {
    fn drop(&mut self) {
        trace!("Releasing snapshot of {} peers", self.peers.len());
    }
}

/// Source of peer snapshots, implemented by the connection manager.
pub trait PeerSource: Send + Sync {
    /// Copy the peer list, waiting for the list lock if needed.
    fn snapshot(&self) -> PeerSnapshot;

    /// Copy the peer list only if the lock is free right now.
    fn try_snapshot(&self) -> Option<PeerSnapshot>;
}

/// Connected peer with an outgoing message queue.
pub struct ConnectedPeer {
    id: u64,
    addr: SocketAddr,
    protocol_version: u32,
    masternode_connection: bool,
    inbound: bool,
    disconnect: AtomicBool,
    outgoing_messages: Mutex<Vec<P2PMessage>>,
}

impl ConnectedPeer {
    pub fn new(id: u64, addr: SocketAddr, protocol_version: u32) -> Self {
        Self {
            id,
            addr,
            protocol_version,
            masternode_connection: false,
            inbound: false,
            disconnect: AtomicBool::new(false),
            outgoing_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn inbound(mut self) -> Self {
        self.inbound = true;
        self
    }

    pub fn masternode_connection(mut self) -> Self {
        self.masternode_connection = true;
        self
    }

    /// Take every message queued for this peer since the last call.
    pub fn get_outgoing_messages(&self) -> Vec<P2PMessage> {
        let mut outgoing = self
            .outgoing_messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *outgoing)
    }
}

impl PeerHandle for ConnectedPeer {
    fn id(&self) -> u64 {
        self.id
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    fn is_masternode_connection(&self) -> bool {
        self.masternode_connection
    }

    fn is_inbound(&self) -> bool {
        self.inbound
    }

    fn send(&self, message: P2PMessage) {
        debug!("Queueing {} for peer {}", message.command(), self.id);
        self.outgoing_messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    fn request_disconnect(&self) {
        self.disconnect.store(true, Ordering::SeqCst);
    }

    fn disconnect_requested(&self) -> bool {
        self.disconnect.load(Ordering::SeqCst)
    }
}

/// The connected peer list.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<Vec<Arc<dyn PeerHandle>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, peer: Arc<dyn PeerHandle>) {
        self.lock_peers().push(peer);
    }

    pub fn remove_peer(&self, id: u64) -> Option<Arc<dyn PeerHandle>> {
        let mut peers = self.lock_peers();
        let pos = peers.iter().position(|p| p.id() == id)?;
        Some(peers.remove(pos))
    }

    /// Drop every peer flagged for disconnection, returning how many went.
    pub fn remove_disconnected(&self) -> usize {
        let mut peers = self.lock_peers();
        let before = peers.len();
        peers.retain(|p| !p.disconnect_requested());
        before - peers.len()
    }

    pub fn len(&self) -> usize {
        self.lock_peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold the list lock, e.g. while the connection manager rebuilds it.
    pub fn lock_peers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn PeerHandle>>> {
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PeerSource for PeerRegistry {
    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot::new(self.lock_peers().clone())
    }

    fn try_snapshot(&self) -> Option<PeerSnapshot> {
        match self.peers.try_lock() {
            Ok(peers) => Some(PeerSnapshot::new(peers.clone())),
            Err(TryLockError::Poisoned(poisoned)) => Some(PeerSnapshot::new(poisoned.into_inner().clone())),
            Err(TryLockError::WouldBlock) => {
                debug!("Peer list busy, skipping");
                None
            }
        }
    }
}
