//! Node subsystems masternode sync depends on but does not own.

use std::sync::Arc;

use rusty_shared_types::BlockTip;

use crate::clock::Clock;
use crate::fulfilled::FulfilledRequestTracker;
use crate::peer_health::PeerStatsProvider;
use crate::peers::{PeerHandle, PeerSource};

/// Read access to the block index.
pub trait ChainIndex: Send + Sync {
    /// Best known header, validated or not.
    fn best_header(&self) -> Option<BlockTip>;
    fn is_importing(&self) -> bool;
    fn is_reindexing(&self) -> bool;
    fn checkpoints_enabled(&self) -> bool;
    /// Height of the last checkpoint for the active network.
    fn checkpoint_height_estimate(&self) -> u64;
}

/// The local masternode list.
pub trait MasternodeRoster: Send + Sync {
    fn count(&self) -> usize;
    /// Ask `peer` for its masternode list.
    fn request_refresh(&self, peer: &dyn PeerHandle);
}

/// Masternode payment votes.
pub trait PaymentVoteLedger: Send + Sync {
    /// Enough blocks and votes are known to stop asking peers.
    fn is_enough_data(&self) -> bool;
    fn min_payments_protocol_version(&self) -> u32;
    /// Number of blocks of votes we keep.
    fn storage_limit(&self) -> u32;
    /// Ask `peer` for votes of blocks we know too little about.
    fn request_low_data_blocks(&self, peer: &dyn PeerHandle);
}

/// Our own masternode, if this node runs one.
pub trait ActiveMasternode: Send + Sync {
    /// Try to bring the local masternode up; called once sync has finished.
    fn manage_state(&self);
}

/// Everything [`MasternodeSync`](crate::MasternodeSync) talks to.
#[derive(Clone)]
pub struct SyncContext {
    pub chain: Arc<dyn ChainIndex>,
    pub peers: Arc<dyn PeerSource>,
    pub peer_stats: Arc<dyn PeerStatsProvider>,
    pub fulfilled: Arc<dyn FulfilledRequestTracker>,
    pub roster: Arc<dyn MasternodeRoster>,
    pub payments: Arc<dyn PaymentVoteLedger>,
    pub active_masternode: Arc<dyn ActiveMasternode>,
    pub clock: Arc<dyn Clock>,
}
