//! Height sanity check for peers we want to sync from.

use std::collections::HashMap;
use std::sync::Mutex;

use log::info;
use rusty_shared_types::PeerHeightStats;

use crate::peers::PeerHandle;

/// Source of per-peer height statistics, kept by the header sync.
pub trait PeerStatsProvider: Send + Sync {
    fn peer_stats(&self, peer_id: u64) -> Option<PeerHeightStats>;
}

/// In-memory per-peer statistics table.
#[derive(Default)]
pub struct PeerStatsTable {
    stats: Mutex<HashMap<u64, PeerHeightStats>>,
}

impl PeerStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, peer_id: u64, stats: PeerHeightStats) {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(peer_id, stats);
    }

    pub fn remove(&self, peer_id: u64) {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&peer_id);
    }
}

impl PeerStatsProvider for PeerStatsTable {
    fn peer_stats(&self, peer_id: u64) -> Option<PeerHeightStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&peer_id)
            .copied()
    }
}

/// Where a peer stands relative to our chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerHeightStatus {
    /// Not enough information about this peer.
    Unknown,
    /// We are more than one block past the height we share with the peer.
    Stuck { common_height: u64 },
    /// The peer announced more headers than we have validated blocks.
    Ahead { sync_height: u64 },
    Healthy,
}

/// Classify a peer against our current height, allowing one block of error.
pub fn classify_peer_height(local_height: u64, stats: Option<PeerHeightStats>) -> PeerHeightStatus {
    let (common_height, sync_height) = match stats {
        Some(PeerHeightStats {
            common_height: Some(common),
            sync_height: Some(sync),
        }) => (common, sync),
        _ => return PeerHeightStatus::Unknown,
    };

    if local_height > common_height.saturating_add(1) {
        PeerHeightStatus::Stuck { common_height }
    } else if local_height.saturating_add(1) < sync_height {
        PeerHeightStatus::Ahead { sync_height }
    } else {
        PeerHeightStatus::Healthy
    }
}

/// True if `peer` is a usable sync source at `local_height`. Stuck peers are
/// flagged for disconnection when `disconnect_stuck` is set, freeing the slot
/// for another peer.
pub fn check_node_height(
    peer: &dyn PeerHandle,
    local_height: u64,
    stats: &dyn PeerStatsProvider,
    disconnect_stuck: bool,
) -> bool {
    match classify_peer_height(local_height, stats.peer_stats(peer.id())) {
        PeerHeightStatus::Unknown => false,
        PeerHeightStatus::Stuck { common_height } => {
            if disconnect_stuck {
                peer.request_disconnect();
                info!(
                    "Disconnecting from stuck peer {}, height={}, common_height={}",
                    peer.id(),
                    local_height,
                    common_height
                );
            } else {
                info!(
                    "Skipping stuck peer {}, height={}, common_height={}",
                    peer.id(),
                    local_height,
                    common_height
                );
            }
            false
        }
        PeerHeightStatus::Ahead { sync_height } => {
            info!(
                "Skipping peer {} who announced more headers than we have blocks, height={}, sync_height={}",
                peer.id(),
                local_height,
                sync_height
            );
            false
        }
        PeerHeightStatus::Healthy => true,
    }
}
