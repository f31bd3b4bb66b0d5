//! Relaying through a live hub over WebSocket

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;

use relaychain::blockchain::{Chain, Target};
use relaychain::bus::ws::{run_hub, WsBus};
use relaychain::bus::{BusMessage, MessageBus, Topic};
use relaychain::crypto::KeyPair;
use relaychain::miner::{CycleOutcome, Miner, MiningParams};
use relaychain::persistence::InMemoryStore;

async fn start_hub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_hub(listener));
    format!("ws://{}", addr)
}

#[tokio::test]
async fn test_hub_relays_between_clients() {
    let url = start_hub().await;
    let alice = WsBus::connect(&url).await.unwrap();
    let bob = WsBus::connect(&url).await.unwrap();

    let mut bob_rx = bob.subscribe(Topic::ClientNotify).unwrap();
    let mut alice_rx = alice.subscribe(Topic::ClientNotify).unwrap();
    let mut bob_other = bob.subscribe(Topic::SetupNotify).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice
        .publish_message(Topic::ClientNotify, &BusMessage::RequestChain)
        .unwrap();

    for rx in [&mut bob_rx, &mut alice_rx] {
        let payload = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("message not relayed")
            .unwrap();
        assert_eq!(BusMessage::from_json(&payload).unwrap(), BusMessage::RequestChain);
    }
    assert!(bob_other.try_recv().is_err());
}

#[tokio::test]
async fn test_sealed_block_reaches_peer_through_hub() {
    let url = start_hub().await;
    let miner_bus = Arc::new(WsBus::connect(&url).await.unwrap());
    let peer = WsBus::connect(&url).await.unwrap();
    let mut peer_rx = peer.subscribe(Topic::MinerNotify).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut miner, _handle) = Miner::new(
        KeyPair::generate().address(),
        Chain::new(Target::MAX),
        MiningParams::default(),
        miner_bus,
        Box::new(InMemoryStore::new()),
    );
    let CycleOutcome::Sealed(block) = miner.mine_once().await.unwrap() else {
        panic!("expected a sealed block");
    };

    let payload = timeout(Duration::from_secs(2), peer_rx.recv())
        .await
        .expect("block not relayed")
        .unwrap();
    let BusMessage::NewBlock(received) = BusMessage::from_json(&payload).unwrap() else {
        panic!("expected a block announcement");
    };
    assert_eq!(received, block);
    assert!(received.verify_hash().is_ok());
}
