//! Decides whether our own chain is recent enough to trust masternode data
//! from peers.

use log::{debug, info};
use rusty_shared_types::BlockTip;
use serde::Serialize;

use crate::collaborators::ChainIndex;
use crate::config::SyncParams;
use crate::peer_health::{check_node_height, PeerStatsProvider};
use crate::peers::PeerSource;

/// Inputs of one blockchain sync evaluation.
pub(crate) struct ChainView<'a> {
    pub tip: Option<BlockTip>,
    pub chain: &'a dyn ChainIndex,
    pub peers: &'a dyn PeerSource,
    pub peer_stats: &'a dyn PeerStatsProvider,
    pub params: &'a SyncParams,
    pub now: u64,
}

/// Memoized blockchain sync status.
#[derive(Debug, Clone, Serialize)]
pub struct BlockchainSyncGate {
    synced: bool,
    synced_once: bool,
    first_block_accepted: bool,
    last_process: u64,
    skipped: u32,
}

impl BlockchainSyncGate {
    pub fn new(now: u64) -> Self {
        Self {
            synced: false,
            synced_once: false,
            first_block_accepted: false,
            last_process: now,
            skipped: 0,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// The chain has been judged synced at least once since start.
    pub fn synced_once(&self) -> bool {
        self.synced_once
    }

    pub fn first_block_accepted(&self) -> bool {
        self.first_block_accepted
    }

    pub fn last_process(&self) -> u64 {
        self.last_process
    }

    /// No evaluation happened for longer than `idle_secs`.
    pub fn is_idle(&self, now: u64, idle_secs: u64) -> bool {
        now.saturating_sub(self.last_process) > idle_secs
    }

    /// Forget everything learned before the idle period.
    pub fn reset_after_idle(&mut self, now: u64) {
        self.synced = false;
        self.first_block_accepted = false;
        self.skipped = 0;
        self.last_process = now;
    }

    /// `assets_settled` is true once masternode sync has finished or failed;
    /// an accepted block before that means we are still downloading.
    pub(crate) fn evaluate(&mut self, block_accepted: bool, assets_settled: bool, view: &ChainView<'_>) -> bool {
        let (tip, best_header) = match (view.tip, view.chain.best_header()) {
            (Some(tip), Some(header)) => (tip, header),
            _ => return false,
        };
        if view.chain.is_importing() || view.chain.is_reindexing() {
            return false;
        }

        if block_accepted {
            if !assets_settled {
                debug!("Block accepted while syncing, resetting blockchain sync status");
                self.first_block_accepted = true;
                self.synced = false;
                self.last_process = view.now;
                return false;
            }
        } else if view.now.saturating_sub(self.last_process) < view.params.tick_interval_secs {
            self.skipped += 1;
            return self.synced;
        }

        debug!(
            "Blockchain sync state before check: {}synced, skipped {} times",
            if self.synced { "" } else { "not " },
            self.skipped
        );
        self.last_process = view.now;
        self.skipped = 0;

        if self.synced {
            return true;
        }

        if view.chain.checkpoints_enabled() && tip.height < view.chain.checkpoint_height_estimate() {
            return false;
        }

        let snapshot = view.peers.snapshot();
        if snapshot.len() >= view.params.enough_peers {
            let mut at_same_height = 0;
            for peer in snapshot.iter() {
                if !check_node_height(peer.as_ref(), tip.height, view.peer_stats, false) {
                    continue;
                }
                at_same_height += 1;
                if at_same_height >= view.params.enough_peers {
                    info!("Found enough peers on the same height as we are, blockchain synced");
                    return self.set_synced(true);
                }
            }
        }
        drop(snapshot);

        // nothing to compare against until we accept a block ourselves
        if !self.first_block_accepted {
            return false;
        }

        let max_block_time = tip.time.max(best_header.time);
        let synced = best_header.height.saturating_sub(tip.height) < view.params.max_header_lag_blocks
            && view.now.saturating_sub(max_block_time) < view.params.network.max_tip_age_secs();
        self.set_synced(synced)
    }

    fn set_synced(&mut self, synced: bool) -> bool {
        self.synced = synced;
        if synced && !self.synced_once {
            self.synced_once = true;
            info!("Blockchain is synced");
        }
        synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_detection() {
        let gate = BlockchainSyncGate::new(1_000);
        assert!(!gate.is_idle(1_000 + 3_600, 3_600));
        assert!(gate.is_idle(1_000 + 3_601, 3_600));
        // clock going backwards is never idle
        assert!(!gate.is_idle(10, 3_600));
    }

    #[test]
    fn test_reset_after_idle_keeps_synced_once() {
        let mut gate = BlockchainSyncGate::new(0);
        gate.set_synced(true);
        gate.first_block_accepted = true;
        gate.skipped = 4;

        gate.reset_after_idle(5_000);

        assert!(!gate.is_synced());
        assert!(gate.synced_once());
        assert!(!gate.first_block_accepted());
        assert_eq!(gate.last_process(), 5_000);
        assert_eq!(gate.skipped, 0);
    }
}
