mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use rusty_masternode_sync::{spawn_sync_ticker, SyncPhase};
use rusty_shared_types::P2PMessage;
use tokio::sync::broadcast;

#[tokio::test]
async fn test_ticker_drives_sync_until_shutdown() {
    let h = Harness::mainnet();
    let peer = h.add_synced_peer(1);
    let sync = Arc::new(Mutex::new(h.sync));

    let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
    let handle = spawn_sync_ticker(sync.clone(), Duration::from_millis(10), shutdown_receiver);

    tokio::time::sleep(Duration::from_millis(80)).await;
    shutdown_sender.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(sync.lock().unwrap().phase(), SyncPhase::Sporks);
    assert_eq!(peer.get_outgoing_messages(), vec![P2PMessage::GetSporks]);
}

#[tokio::test]
async fn test_ticker_stops_when_sender_dropped() {
    let h = Harness::mainnet();
    let sync = Arc::new(Mutex::new(h.sync));

    let (shutdown_sender, shutdown_receiver) = broadcast::channel::<()>(1);
    let handle = spawn_sync_ticker(sync, Duration::from_millis(10), shutdown_receiver);
    drop(shutdown_sender);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("ticker did not stop")
        .unwrap();
}
