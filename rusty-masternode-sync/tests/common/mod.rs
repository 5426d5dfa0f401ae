//! Shared fixtures for the masternode sync integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rusty_masternode_sync::{
    ActiveMasternode, ChainIndex, ConnectedPeer, ManualClock, MasternodeRoster, MasternodeSync,
    NetFulfilledRequestManager, PaymentVoteLedger, PeerHandle, PeerRegistry, PeerStatsTable, SyncContext,
    SyncParams, SyncResult,
};
use rusty_shared_types::{BlockTip, P2PMessage, PeerHeightStats};

pub const START: u64 = 1_700_000_000;
pub const TIP_HEIGHT: u64 = 500_000;
pub const MIN_PROTOCOL_VERSION: u32 = 70_208;
pub const STORAGE_LIMIT: u32 = 5_000;

pub fn init_logger() {
    env_logger::builder().is_test(true).try_init().unwrap_or(());
}

pub fn peer_addr(id: u64) -> SocketAddr {
    format!("10.1.{}.{}:8168", id / 256, id % 256).parse().unwrap()
}

#[derive(Default)]
pub struct MockChain {
    pub best_header: Mutex<Option<BlockTip>>,
    pub importing: AtomicBool,
    pub checkpoints: AtomicBool,
    pub checkpoint_estimate: AtomicU64,
}

impl MockChain {
    pub fn set_best_header(&self, header: BlockTip) {
        *self.best_header.lock().unwrap() = Some(header);
    }
}

impl ChainIndex for MockChain {
    fn best_header(&self) -> Option<BlockTip> {
        *self.best_header.lock().unwrap()
    }

    fn is_importing(&self) -> bool {
        self.importing.load(Ordering::SeqCst)
    }

    fn is_reindexing(&self) -> bool {
        false
    }

    fn checkpoints_enabled(&self) -> bool {
        self.checkpoints.load(Ordering::SeqCst)
    }

    fn checkpoint_height_estimate(&self) -> u64 {
        self.checkpoint_estimate.load(Ordering::SeqCst)
    }
}

/// Roster that answers refresh requests by queueing a list request on the peer.
#[derive(Default)]
pub struct MockRoster {
    pub count: AtomicUsize,
    pub refreshed: Mutex<Vec<u64>>,
}

impl MasternodeRoster for MockRoster {
    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn request_refresh(&self, peer: &dyn PeerHandle) {
        self.refreshed.lock().unwrap().push(peer.id());
        peer.send(P2PMessage::MasternodeListRequest);
    }
}

#[derive(Default)]
pub struct MockLedger {
    pub enough_data: AtomicBool,
    pub low_data_requests: Mutex<Vec<u64>>,
}

impl PaymentVoteLedger for MockLedger {
    fn is_enough_data(&self) -> bool {
        self.enough_data.load(Ordering::SeqCst)
    }

    fn min_payments_protocol_version(&self) -> u32 {
        MIN_PROTOCOL_VERSION
    }

    fn storage_limit(&self) -> u32 {
        STORAGE_LIMIT
    }

    fn request_low_data_blocks(&self, peer: &dyn PeerHandle) {
        self.low_data_requests.lock().unwrap().push(peer.id());
    }
}

#[derive(Default)]
pub struct MockActiveMasternode {
    pub calls: AtomicUsize,
}

impl ActiveMasternode for MockActiveMasternode {
    fn manage_state(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub chain: Arc<MockChain>,
    pub registry: Arc<PeerRegistry>,
    pub stats: Arc<PeerStatsTable>,
    pub fulfilled: Arc<NetFulfilledRequestManager>,
    pub roster: Arc<MockRoster>,
    pub ledger: Arc<MockLedger>,
    pub active: Arc<MockActiveMasternode>,
    pub sync: MasternodeSync,
}

impl Harness {
    /// Chain tip at [`TIP_HEIGHT`] mined a minute ago, best header equal to
    /// the tip, a roster with 10 entries and no peers.
    pub fn new(params: SyncParams) -> Self {
        init_logger();
        let clock = Arc::new(ManualClock::new(START));
        let chain = Arc::new(MockChain::default());
        let registry = Arc::new(PeerRegistry::new());
        let stats = Arc::new(PeerStatsTable::new());
        let fulfilled = Arc::new(NetFulfilledRequestManager::new(
            clock.clone(),
            params.fulfilled_request_expiry_secs,
        ));
        let roster = Arc::new(MockRoster::default());
        roster.count.store(10, Ordering::SeqCst);
        let ledger = Arc::new(MockLedger::default());
        let active = Arc::new(MockActiveMasternode::default());

        let ctx = SyncContext {
            chain: chain.clone(),
            peers: registry.clone(),
            peer_stats: stats.clone(),
            fulfilled: fulfilled.clone(),
            roster: roster.clone(),
            payments: ledger.clone(),
            active_masternode: active.clone(),
            clock: clock.clone(),
        };
        let mut sync = MasternodeSync::new(params, ctx);

        let tip = BlockTip::new(TIP_HEIGHT, START - 60);
        chain.set_best_header(tip);
        sync.updated_block_tip(tip);

        Self {
            clock,
            chain,
            registry,
            stats,
            fulfilled,
            roster,
            ledger,
            active,
            sync,
        }
    }

    pub fn mainnet() -> Self {
        Self::new(SyncParams::default())
    }

    pub fn add_peer(&self, peer: ConnectedPeer) -> Arc<ConnectedPeer> {
        let peer = Arc::new(peer);
        self.registry.add_peer(peer.clone());
        peer
    }

    /// A peer at our height with a recent enough protocol.
    pub fn add_synced_peer(&self, id: u64) -> Arc<ConnectedPeer> {
        self.add_peer_with_version(id, MIN_PROTOCOL_VERSION)
    }

    pub fn add_peer_with_version(&self, id: u64, version: u32) -> Arc<ConnectedPeer> {
        self.stats.update(id, PeerHeightStats::new(TIP_HEIGHT, TIP_HEIGHT));
        self.add_peer(ConnectedPeer::new(id, peer_addr(id), version))
    }

    pub fn add_synced_peers(&self, count: u64) -> Vec<Arc<ConnectedPeer>> {
        (1..=count).map(|id| self.add_synced_peer(id)).collect()
    }

    /// One working tick followed by the idle ticks up to the next one, the
    /// clock moving one second per call.
    pub fn run_cycle(&mut self) -> SyncResult<()> {
        for _ in 0..self.sync.params().tick_interval_secs {
            self.sync.tick()?;
            self.clock.advance(1);
        }
        Ok(())
    }

    pub fn run_cycles(&mut self, cycles: usize) -> SyncResult<()> {
        for _ in 0..cycles {
            self.run_cycle()?;
        }
        Ok(())
    }
}

pub fn drain(peers: &[Arc<ConnectedPeer>]) -> Vec<Vec<P2PMessage>> {
    peers.iter().map(|p| p.get_outgoing_messages()).collect()
}
