//! Masternode asset synchronization.
//!
//! A freshly started node pulls sporks, the masternode list and masternode
//! payment votes from its peers before it trusts any of them.
//! [`MasternodeSync`] runs that process; [`spawn_sync_ticker`] drives it from
//! a tokio timer.

pub mod blockchain_sync;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod fulfilled;
pub mod masternode_sync;
pub mod peer_health;
pub mod peers;

pub use blockchain_sync::BlockchainSyncGate;
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{ActiveMasternode, ChainIndex, MasternodeRoster, PaymentVoteLedger, SyncContext};
pub use config::{NetworkKind, SyncParams};
pub use driver::spawn_sync_ticker;
pub use error::{SyncError, SyncResult};
pub use fulfilled::{FulfilledRequestTracker, NetFulfilledRequestManager, RequestKind};
pub use masternode_sync::{MasternodeSync, SyncPhase, SyncStatus};
pub use peer_health::{check_node_height, classify_peer_height, PeerHeightStatus, PeerStatsProvider, PeerStatsTable};
pub use peers::{ConnectedPeer, PeerHandle, PeerRegistry, PeerSnapshot, PeerSource};
