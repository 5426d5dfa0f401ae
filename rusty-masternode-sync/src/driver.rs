//! Timer task that drives [`MasternodeSync::tick`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::masternode_sync::MasternodeSync;

/// Call `tick` every `period` until a shutdown signal arrives. Missed ticks
/// are skipped, never replayed.
pub fn spawn_sync_ticker(
    sync: Arc<Mutex<MasternodeSync>>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Masternode sync ticker started, period {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !tick_once(&sync) {
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Masternode sync ticker received shutdown signal.");
                    break;
                }
            }
        }
    })
}

/// Run one tick; false once the state can no longer be used.
fn tick_once(sync: &Mutex<MasternodeSync>) -> bool {
    let mut state = match sync.lock() {
        Ok(guard) => guard,
        Err(_) => {
            error!("Masternode sync state poisoned, stopping ticker");
            return false;
        }
    };
    if let Err(e) = state.tick() {
        error!("Masternode sync tick failed: {}", e);
    }
    true
}
