use serde::{Deserialize, Serialize};

/// Sync-related P2P messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum P2PMessage {
    /// Ask a peer for every spork it currently knows about.
    GetSporks,
    /// Ask a peer for its full masternode list (dseg).
    MasternodeListRequest,
    /// Ask a peer for the payment votes it holds.
    MasternodePaymentSync(MasternodePaymentSync),
    /// Inventory count reported by a peer while we are syncing.
    SyncStatusCount(SyncStatusCount),
}

impl P2PMessage {
    /// Wire command name, as used in logs.
    pub fn command(&self) -> &'static str {
        match self {
            P2PMessage::GetSporks => "getsporks",
            P2PMessage::MasternodeListRequest => "dseg",
            P2PMessage::MasternodePaymentSync(_) => "mnget",
            P2PMessage::SyncStatusCount(_) => "ssc",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Payment vote sync request. `storage_limit` is the number of blocks worth of
/// votes the requester keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodePaymentSync {
    pub storage_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusCount {
    pub item_id: i32,
    pub count: i32,
}

/// Height statistics the header sync keeps for a connected peer.
///
/// `common_height` is the highest block we provably share with the peer,
/// `sync_height` is the height the peer announced through headers. `None`
/// means there is not enough information yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerHeightStats {
    pub common_height: Option<u64>,
    pub sync_height: Option<u64>,
}

impl PeerHeightStats {
    pub fn new(common_height: u64, sync_height: u64) -> Self {
        Self {
            common_height: Some(common_height),
            sync_height: Some(sync_height),
        }
    }

    /// Build from the raw node-state counters, where `-1` marks an unknown height.
    pub fn from_raw(common_height: i64, sync_height: i64) -> Self {
        let known = |h: i64| if h < 0 { None } else { Some(h as u64) };
        Self {
            common_height: known(common_height),
            sync_height: known(sync_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_count_decodes() {
        let msg = P2PMessage::SyncStatusCount(SyncStatusCount { item_id: 2, count: 1500 });
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(P2PMessage::from_bytes(&bytes).unwrap(), msg);
        assert_eq!(msg.command(), "ssc");
    }

    #[test]
    fn test_truncated_message_is_rejected() {
        let bytes = P2PMessage::MasternodePaymentSync(MasternodePaymentSync { storage_limit: 5000 })
            .to_bytes()
            .unwrap();
        assert!(P2PMessage::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_raw_stats_minus_one_is_unknown() {
        let stats = PeerHeightStats::from_raw(-1, 120);
        assert_eq!(stats.common_height, None);
        assert_eq!(stats.sync_height, Some(120));
        assert_eq!(PeerHeightStats::from_raw(118, 120), PeerHeightStats::new(118, 120));
    }
}
