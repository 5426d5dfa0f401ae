//! Types shared between the Rusty Coin node components: chain tips, peer
//! statistics and the sync-related P2P messages.

pub mod chain;
pub mod p2p;

pub use chain::BlockTip;
pub use p2p::{MasternodePaymentSync, P2PMessage, PeerHeightStats, SyncStatusCount};
