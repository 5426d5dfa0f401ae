//! Bookkeeping of requests already made to (or served for) a peer address.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::clock::Clock;

/// Request labels used by masternode sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    SporkSync,
    MasternodeListSync,
    MasternodePaymentSync,
    FullSync,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::SporkSync,
        RequestKind::MasternodeListSync,
        RequestKind::MasternodePaymentSync,
        RequestKind::FullSync,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RequestKind::SporkSync => "spork-sync",
            RequestKind::MasternodeListSync => "roster-sync",
            RequestKind::MasternodePaymentSync => "payment-vote-sync",
            RequestKind::FullSync => "full-sync",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks which requests each peer address has already fulfilled.
pub trait FulfilledRequestTracker: Send + Sync {
    fn has_fulfilled(&self, addr: SocketAddr, kind: RequestKind) -> bool;
    fn add_fulfilled(&self, addr: SocketAddr, kind: RequestKind);
    fn remove_fulfilled(&self, addr: SocketAddr, kind: RequestKind);
}

/// In-memory tracker; every record expires a fixed time after it was added.
pub struct NetFulfilledRequestManager {
    clock: Arc<dyn Clock>,
    expiry_secs: u64,
    /// addr -> kind -> expiry time
    fulfilled: Mutex<HashMap<SocketAddr, HashMap<RequestKind, u64>>>,
}

impl NetFulfilledRequestManager {
    pub fn new(clock: Arc<dyn Clock>, expiry_secs: u64) -> Self {
        Self {
            clock,
            expiry_secs,
            fulfilled: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, HashMap<RequestKind, u64>>> {
        self.fulfilled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop expired records and addresses left without any.
    pub fn check_and_remove(&self) {
        let now = self.clock.now();
        let mut fulfilled = self.lock();
        for requests in fulfilled.values_mut() {
            requests.retain(|_, expires_at| *expires_at >= now);
        }
        fulfilled.retain(|_, requests| !requests.is_empty());
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FulfilledRequestTracker for NetFulfilledRequestManager {
    fn has_fulfilled(&self, addr: SocketAddr, kind: RequestKind) -> bool {
        let now = self.clock.now();
        self.lock()
            .get(&addr)
            .and_then(|requests| requests.get(&kind))
            .map_or(false, |expires_at| *expires_at >= now)
    }

    fn add_fulfilled(&self, addr: SocketAddr, kind: RequestKind) {
        let expires_at = self.clock.now().saturating_add(self.expiry_secs);
        debug!("Marking {} fulfilled for {} until {}", kind, addr, expires_at);
        self.lock().entry(addr).or_default().insert(kind, expires_at);
    }

    fn remove_fulfilled(&self, addr: SocketAddr, kind: RequestKind) {
        let mut fulfilled = self.lock();
        if let Some(requests) = fulfilled.get_mut(&addr) {
            requests.remove(&kind);
            if requests.is_empty() {
                fulfilled.remove(&addr);
            }
        }
    }
}
