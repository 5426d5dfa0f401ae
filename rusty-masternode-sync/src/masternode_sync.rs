//! Masternode asset synchronization.
//!
//! After the node connects to the network it pulls sporks, the masternode
//! list and the masternode payment votes from its peers, one asset after the
//! other. [`MasternodeSync::tick`] is called once per second by the node timer
//! and does real work every `tick_interval_secs` calls.
//!
//! Peer contact is paced on purpose: at most one list or payment request goes
//! out per working tick, so each peer gets one request every few seconds.

use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use rusty_shared_types::{BlockTip, MasternodePaymentSync, P2PMessage};
use serde::Serialize;

use crate::blockchain_sync::{BlockchainSyncGate, ChainView};
use crate::collaborators::SyncContext;
use crate::config::SyncParams;
use crate::error::{SyncError, SyncResult};
use crate::fulfilled::{FulfilledRequestTracker, RequestKind};
use crate::peer_health::check_node_height;
use crate::peers::PeerHandle;

/// Attempts per asset used when estimating progress.
const PROGRESS_ATTEMPTS_PER_ASSET: u32 = 8;

/// Sync phase. Moves forward one step at a time, or to `Failed`; only
/// [`MasternodeSync::reset`] goes back to `Initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncPhase {
    Initial,
    Sporks,
    Roster,
    PaymentVotes,
    Failed,
    Finished,
}

impl SyncPhase {
    /// Position in the forward sequence; `Failed` sits outside it.
    pub fn ordinal(self) -> Option<u32> {
        match self {
            SyncPhase::Initial => Some(0),
            SyncPhase::Sporks => Some(1),
            SyncPhase::Roster => Some(2),
            SyncPhase::PaymentVotes => Some(3),
            SyncPhase::Finished => Some(4),
            SyncPhase::Failed => None,
        }
    }

    pub fn asset_name(self) -> &'static str {
        match self {
            SyncPhase::Initial => "MASTERNODE_SYNC_INITIAL",
            SyncPhase::Sporks => "MASTERNODE_SYNC_SPORKS",
            SyncPhase::Roster => "MASTERNODE_SYNC_LIST",
            SyncPhase::PaymentVotes => "MASTERNODE_SYNC_MNW",
            SyncPhase::Failed => "MASTERNODE_SYNC_FAILED",
            SyncPhase::Finished => "MASTERNODE_SYNC_FINISHED",
        }
    }

    pub fn status_text(self) -> &'static str {
        match self {
            SyncPhase::Initial => "Synchronization pending...",
            SyncPhase::Sporks => "Synchronizing sporks...",
            SyncPhase::Roster => "Synchronizing roster...",
            SyncPhase::PaymentVotes => "Synchronizing payment votes...",
            SyncPhase::Failed => "Synchronization failed",
            SyncPhase::Finished => "Synchronization finished",
        }
    }

    fn is_past_sporks(self) -> bool {
        matches!(self, SyncPhase::Roster | SyncPhase::PaymentVotes | SyncPhase::Finished)
    }
}

/// Point-in-time view of the sync state, e.g. for RPC.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub asset_name: &'static str,
    pub status: &'static str,
    pub attempt: u32,
    pub phase_started_at: u64,
    pub failure_count: u32,
    pub last_failure: u64,
    pub progress: f64,
    pub blockchain_synced: bool,
}

/// What to do after handling one peer.
enum PeerStep {
    /// Look at the next peer in the snapshot.
    Next,
    /// This tick is done.
    Done,
}

/// Masternode asset sync state machine
pub struct MasternodeSync {
    params: SyncParams,
    ctx: SyncContext,
    phase: SyncPhase,
    attempt: u32,
    phase_started_at: u64,
    last_masternode_list: u64,
    last_payment_vote: u64,
    last_failure: u64,
    failure_count: u32,
    tick_count: u64,
    current_tip: Option<BlockTip>,
    chain_gate: BlockchainSyncGate,
}

impl MasternodeSync {
    pub fn new(params: SyncParams, ctx: SyncContext) -> Self {
        let now = ctx.clock.now();
        Self {
            params,
            phase: SyncPhase::Initial,
            attempt: 0,
            phase_started_at: now,
            last_masternode_list: now,
            last_payment_vote: now,
            last_failure: 0,
            failure_count: 0,
            tick_count: 0,
            current_tip: None,
            chain_gate: BlockchainSyncGate::new(now),
            ctx,
        }
    }

    pub fn params(&self) -> &SyncParams {
        &self.params
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase_started_at(&self) -> u64 {
        self.phase_started_at
    }

    pub fn last_masternode_list(&self) -> u64 {
        self.last_masternode_list
    }

    pub fn last_payment_vote(&self) -> u64 {
        self.last_payment_vote
    }

    pub fn last_failure(&self) -> u64 {
        self.last_failure
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn current_tip(&self) -> Option<BlockTip> {
        self.current_tip
    }

    pub fn chain_gate(&self) -> &BlockchainSyncGate {
        &self.chain_gate
    }

    pub fn is_failed(&self) -> bool {
        self.phase == SyncPhase::Failed
    }

    /// All assets are synced.
    pub fn is_synced(&self) -> bool {
        self.phase == SyncPhase::Finished
    }

    pub fn is_masternode_list_synced(&self) -> bool {
        matches!(self.phase, SyncPhase::PaymentVotes | SyncPhase::Finished)
    }

    pub fn is_payment_votes_synced(&self) -> bool {
        self.phase == SyncPhase::Finished
    }

    pub fn asset_name(&self) -> &'static str {
        self.phase.asset_name()
    }

    pub fn sync_status(&self) -> &'static str {
        self.phase.status_text()
    }

    /// Rough progress in `[0, 1]`. Cosmetic only.
    pub fn progress(&self) -> f64 {
        let last = SyncPhase::Finished.ordinal().unwrap_or(1) as f64;
        match self.phase.ordinal() {
            None => 0.0,
            Some(ordinal) => {
                let attempts = self.attempt.min(PROGRESS_ATTEMPTS_PER_ASSET) as f64
                    / PROGRESS_ATTEMPTS_PER_ASSET as f64;
                ((ordinal as f64 + attempts) / last).min(1.0)
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            phase: self.phase,
            asset_name: self.asset_name(),
            status: self.sync_status(),
            attempt: self.attempt,
            phase_started_at: self.phase_started_at,
            failure_count: self.failure_count,
            last_failure: self.last_failure,
            progress: self.progress(),
            blockchain_synced: self.chain_gate.is_synced(),
        }
    }

    /// New tip notification from the block index (new block or reorg).
    pub fn updated_block_tip(&mut self, tip: BlockTip) {
        self.current_tip = Some(tip);
    }

    /// Block accepted notification from validation.
    pub fn notify_block_accepted(&mut self) -> bool {
        self.is_blockchain_synced(true)
    }

    /// The masternode manager received new list entries.
    pub fn added_masternode_list(&mut self) {
        self.last_masternode_list = self.ctx.clock.now();
    }

    /// The payment manager received a new vote.
    pub fn added_payment_vote(&mut self) {
        self.last_payment_vote = self.ctx.clock.now();
    }

    /// Whether our chain is current enough to sync masternode assets.
    /// `block_accepted` is set when called for a freshly accepted block.
    pub fn is_blockchain_synced(&mut self, block_accepted: bool) -> bool {
        let now = self.ctx.clock.now();

        if self.chain_gate.is_idle(now, self.params.idle_reset_secs) {
            warn!(
                "No blockchain sync check for {}s, assuming wake from sleep and restarting sync",
                now.saturating_sub(self.chain_gate.last_process())
            );
            self.reset();
            self.chain_gate.reset_after_idle(now);
            return false;
        }

        let assets_settled = self.is_synced() || self.is_failed();
        let view = ChainView {
            tip: self.current_tip,
            chain: self.ctx.chain.as_ref(),
            peers: self.ctx.peers.as_ref(),
            peer_stats: self.ctx.peer_stats.as_ref(),
            params: &self.params,
            now,
        };
        self.chain_gate.evaluate(block_accepted, assets_settled, &view)
    }

    /// Check a peer's height against our tip. See
    /// [`check_node_height`](crate::peer_health::check_node_height).
    pub fn check_node_height(&self, peer: &dyn PeerHandle, disconnect_stuck: bool) -> bool {
        match self.current_tip {
            Some(tip) => check_node_height(peer, tip.height, self.ctx.peer_stats.as_ref(), disconnect_stuck),
            None => false,
        }
    }

    pub fn fail(&mut self) {
        self.last_failure = self.ctx.clock.now();
        self.failure_count += 1;
        self.phase = SyncPhase::Failed;
    }

    /// Start over from `Initial`.
    pub fn reset(&mut self) {
        let now = self.ctx.clock.now();
        self.phase = SyncPhase::Initial;
        self.attempt = 0;
        self.phase_started_at = now;
        self.last_masternode_list = now;
        self.last_payment_vote = now;
        self.last_failure = 0;
        self.failure_count = 0;
    }

    pub fn switch_to_next_asset(&mut self) -> SyncResult<()> {
        let now = self.ctx.clock.now();
        match self.phase {
            SyncPhase::Failed | SyncPhase::Finished => {
                return Err(SyncError::InvalidTransition(self.phase));
            }
            SyncPhase::Initial => {
                self.clear_fulfilled_requests();
                self.phase = SyncPhase::Sporks;
                info!("Starting {}", self.asset_name());
            }
            SyncPhase::Sporks => {
                self.last_masternode_list = now;
                self.phase = SyncPhase::Roster;
                info!("Starting {}", self.asset_name());
            }
            SyncPhase::Roster => {
                self.last_payment_vote = now;
                self.phase = SyncPhase::PaymentVotes;
                info!("Starting {}", self.asset_name());
            }
            SyncPhase::PaymentVotes => {
                self.phase = SyncPhase::Finished;
                info!("Sync has finished");
                self.finalize_sync();
            }
        }
        self.attempt = 0;
        self.phase_started_at = now;
        Ok(())
    }

    fn finalize_sync(&self) {
        // try to activate our masternode if possible
        self.ctx.active_masternode.manage_state();

        let Some(snapshot) = self.ctx.peers.try_snapshot() else {
            return;
        };
        for peer in snapshot.iter() {
            self.ctx.fulfilled.add_fulfilled(peer.addr(), RequestKind::FullSync);
        }
    }

    fn clear_fulfilled_requests(&self) {
        let Some(snapshot) = self.ctx.peers.try_snapshot() else {
            return;
        };
        for peer in snapshot.iter() {
            for kind in RequestKind::ALL {
                self.ctx.fulfilled.remove_fulfilled(peer.addr(), kind);
            }
        }
    }

    /// Inbound sync message from `peer`.
    pub fn process_message(&self, peer: &dyn PeerHandle, message: &P2PMessage) {
        if let P2PMessage::SyncStatusCount(status) = message {
            // do not care about stats if sync process finished or failed
            if self.is_synced() || self.is_failed() {
                return;
            }
            info!(
                "Got inventory count: item_id={} count={} peer={}",
                status.item_id, status.count, peer.id()
            );
        }
    }

    /// Decode and handle a raw inbound sync message.
    pub fn process_raw_message(&self, peer: &dyn PeerHandle, payload: &[u8]) -> SyncResult<()> {
        let message = P2PMessage::from_bytes(payload)?;
        self.process_message(peer, &message);
        Ok(())
    }

    /// Timer entry point, called once per second.
    ///
    /// Errors only on an invalid phase transition, which indicates a bug.
    pub fn tick(&mut self) -> SyncResult<()> {
        let tick = self.tick_count;
        self.tick_count = self.tick_count.wrapping_add(1);
        if tick % self.params.tick_interval_secs.max(1) != 0 {
            return Ok(());
        }
        if self.current_tip.is_none() {
            return Ok(());
        }

        let now = self.ctx.clock.now();
        let masternode_count = self.ctx.roster.count();
        debug!("tick {} masternode count {}", tick, masternode_count);

        if self.is_synced() {
            // resync if we lost all masternodes from sleep/wake or failed to sync originally
            if masternode_count == 0 {
                warn!("Not enough masternode data, restarting sync");
                self.reset();
            } else {
                self.run_maintenance(masternode_count);
            }
            return Ok(());
        }

        if self.is_failed() {
            if now >= self.last_failure.saturating_add(self.params.failure_cooldown_secs) {
                info!("Failure cooldown elapsed, restarting sync");
                self.reset();
            }
            return Ok(());
        }

        debug!(
            "tick {} asset {} attempt {} progress {:.3}",
            tick,
            self.asset_name(),
            self.attempt,
            self.progress()
        );

        let fast_sync = self.params.network.is_fast_sync();
        if !fast_sync && !self.is_blockchain_synced(false) && self.phase.is_past_sporks() {
            // keep the phase timers fresh until we are almost at a recent block
            self.phase_started_at = now;
            self.last_masternode_list = now;
            self.last_payment_vote = now;
            return Ok(());
        }

        if self.phase == SyncPhase::Initial
            || (self.phase == SyncPhase::Sporks && self.is_blockchain_synced(false))
        {
            self.switch_to_next_asset()?;
        }

        let snapshot = self.ctx.peers.snapshot();
        for peer in snapshot.iter() {
            let peer = peer.as_ref();
            // Outbound masternode connections are temporary and unreliable for
            // sync. An inbound connection this early is most likely another
            // masternode connecting to ours.
            if peer.is_masternode_connection() || (self.params.masternode_mode && peer.is_inbound()) {
                continue;
            }

            if fast_sync {
                self.fast_sync_step(peer, now);
                return Ok(());
            }

            if let PeerStep::Done = self.sync_with_peer(peer, tick, now)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Regtest: one request per tick, driven by the attempt counter alone.
    fn fast_sync_step(&mut self, peer: &dyn PeerHandle, now: u64) {
        match self.attempt {
            0..=2 => peer.send(P2PMessage::GetSporks),
            3 => self.ctx.roster.request_refresh(peer),
            4 | 5 => peer.send(P2PMessage::MasternodePaymentSync(MasternodePaymentSync {
                storage_limit: self.ctx.roster.count() as u32,
            })),
            _ => {
                // finalization is skipped, there is nothing to activate on regtest
                info!("Quick sync done");
                self.phase = SyncPhase::Finished;
                self.attempt = 0;
                self.phase_started_at = now;
                return;
            }
        }
        self.attempt += 1;
    }

    fn sync_with_peer(&mut self, peer: &dyn PeerHandle, tick: u64, now: u64) -> SyncResult<PeerStep> {
        let fulfilled = Arc::clone(&self.ctx.fulfilled);
        let addr = peer.addr();

        if fulfilled.has_fulfilled(addr, RequestKind::FullSync) {
            // already fully synced from this peer recently, free the slot
            peer.request_disconnect();
            info!("Disconnecting from recently synced peer {}", peer.id());
            return Ok(PeerStep::Next);
        }

        if !fulfilled.has_fulfilled(addr, RequestKind::SporkSync) {
            fulfilled.add_fulfilled(addr, RequestKind::SporkSync);
            peer.send(P2PMessage::GetSporks);
            info!(
                "tick {} asset {} -- requesting sporks from peer {}",
                tick,
                self.asset_name(),
                peer.id()
            );
            // sporks always come first, move on without waiting for the next tick
            return Ok(PeerStep::Next);
        }

        match self.phase {
            SyncPhase::Roster => self.sync_masternode_list(peer, fulfilled.as_ref(), tick, now),
            SyncPhase::PaymentVotes => self.sync_payment_votes(peer, fulfilled.as_ref(), tick, now),
            _ => Ok(PeerStep::Next),
        }
    }

    fn sync_masternode_list(
        &mut self,
        peer: &dyn PeerHandle,
        fulfilled: &dyn FulfilledRequestTracker,
        tick: u64,
        now: u64,
    ) -> SyncResult<PeerStep> {
        if self.timed_out(self.last_masternode_list, now) {
            self.on_timeout(tick)?;
            return Ok(PeerStep::Done);
        }

        if !self.claim_peer(peer, fulfilled, RequestKind::MasternodeListSync) {
            return Ok(PeerStep::Next);
        }
        self.attempt += 1;
        info!("tick {} -- requesting masternode list from peer {}", tick, peer.id());
        self.ctx.roster.request_refresh(peer);
        Ok(PeerStep::Done)
    }

    fn sync_payment_votes(
        &mut self,
        peer: &dyn PeerHandle,
        fulfilled: &dyn FulfilledRequestTracker,
        tick: u64,
        now: u64,
    ) -> SyncResult<PeerStep> {
        trace!(
            "tick {} last payment vote {} now {} diff {}",
            tick,
            self.last_payment_vote,
            now,
            now.saturating_sub(self.last_payment_vote)
        );
        // New blocks keep the votes flowing, so this can take much longer
        // than the timeout, but it times out eventually.
        if self.timed_out(self.last_payment_vote, now) {
            self.on_timeout(tick)?;
            return Ok(PeerStep::Done);
        }

        // ask at least two peers before trusting the ledger's own judgement
        if self.attempt > 1 && self.ctx.payments.is_enough_data() {
            info!("tick {} asset {} -- found enough data", tick, self.asset_name());
            self.switch_to_next_asset()?;
            return Ok(PeerStep::Done);
        }

        if !self.claim_peer(peer, fulfilled, RequestKind::MasternodePaymentSync) {
            return Ok(PeerStep::Next);
        }
        self.attempt += 1;
        info!("tick {} -- requesting payment votes from peer {}", tick, peer.id());
        // all votes the peer has; new peers only return votes for future payments
        peer.send(P2PMessage::MasternodePaymentSync(MasternodePaymentSync {
            storage_limit: self.ctx.payments.storage_limit(),
        }));
        // and the blocks we are missing votes for
        self.ctx.payments.request_low_data_blocks(peer);
        Ok(PeerStep::Done)
    }

    /// Mark `kind` as asked from `peer`; true if the peer should actually be
    /// asked now. Each peer is asked once, and only if it speaks a recent
    /// enough protocol.
    fn claim_peer(&self, peer: &dyn PeerHandle, fulfilled: &dyn FulfilledRequestTracker, kind: RequestKind) -> bool {
        if fulfilled.has_fulfilled(peer.addr(), kind) {
            return false;
        }
        fulfilled.add_fulfilled(peer.addr(), kind);
        peer.protocol_version() >= self.ctx.payments.min_payments_protocol_version()
    }

    fn timed_out(&self, last_activity: u64, now: u64) -> bool {
        now.saturating_sub(last_activity) > self.params.timeout_secs
    }

    fn on_timeout(&mut self, tick: u64) -> SyncResult<()> {
        warn!("tick {} asset {} -- timeout", tick, self.asset_name());
        if self.attempt == 0 {
            // no way to continue without this asset, fail and try later
            error!("Failed to sync {}", self.asset_name());
            self.fail();
            return Ok(());
        }
        self.switch_to_next_asset()
    }

    fn run_maintenance(&self, masternode_count: usize) {
        let snapshot = self.ctx.peers.snapshot();
        trace!(
            "Sync finished, {} peers connected, {} masternodes known",
            snapshot.len(),
            masternode_count
        );
    }
}
