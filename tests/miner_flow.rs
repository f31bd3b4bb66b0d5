//! End-to-end tests for the mining loop: bootstrap, sealing, interruption
//! and reconciliation with blocks published by other miners.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use relaychain::blockchain::{Block, Chain, Target, MAX_TRANSACTIONS};
use relaychain::bus::{BusMessage, LocalBus, MessageBus, Topic};
use relaychain::crypto::KeyPair;
use relaychain::miner::{CycleOutcome, Miner, MinerHandle, MiningParams};
use relaychain::node::{bootstrap_chain, spawn_miner_routers, ChainSource};
use relaychain::persistence::{ChainStore, InMemoryStore, JsonChainFile};
use relaychain::transaction::Transaction;

fn params() -> MiningParams {
    MiningParams {
        yield_every: 32,
        ..MiningParams::default()
    }
}

fn transfer(from: &KeyPair, amount: u64) -> Transaction {
    Transaction::signed_transfer(from, &KeyPair::generate().address(), amount).unwrap()
}

/// A miner wired to `bus` with its routers running.
fn networked_miner(bus: &Arc<LocalBus>, chain: Chain) -> (Miner, MinerHandle) {
    let (miner, handle) = Miner::new(
        KeyPair::generate().address(),
        chain,
        params(),
        bus.clone(),
        Box::new(InMemoryStore::new()),
    );
    spawn_miner_routers(bus.as_ref(), handle.clone()).unwrap();
    (miner, handle)
}

#[tokio::test]
async fn test_fresh_miner_seals_reward_block_and_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain.json");
    let bus = Arc::new(LocalBus::default());
    let store = JsonChainFile::new(&path);

    let (chain, source) = bootstrap_chain(bus.as_ref(), &store, Target::MAX, Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(source, ChainSource::Empty);

    let miner_address = KeyPair::generate().address();
    let (mut miner, handle) = Miner::new(
        miner_address.clone(),
        chain,
        params(),
        bus.clone(),
        Box::new(store),
    );

    let CycleOutcome::Sealed(block) = miner.mine_once().await.unwrap() else {
        panic!("expected a sealed block");
    };
    assert_eq!(miner.chain().height(), 1);
    assert_eq!(block.transactions().len(), 1);
    assert_eq!(block.transactions()[0].recipient, miner_address);

    handle.shutdown().unwrap();
    let chain = miner.run().await.unwrap();
    assert_eq!(chain.height(), 1);

    let saved = JsonChainFile::new(&path).load_blocks();
    assert_eq!(saved, vec![block]);
    assert!(saved[0].verify_hash().is_ok());
}

#[tokio::test]
async fn test_block_is_capped_and_rest_stays_pooled() {
    let bus = Arc::new(LocalBus::default());
    let (mut miner, handle) = networked_miner(&bus, Chain::new(Target::MAX));
    let alice = KeyPair::generate();
    for amount in 1..=12 {
        handle.add_transaction(transfer(&alice, amount)).unwrap();
    }

    let CycleOutcome::Sealed(block) = miner.mine_once().await.unwrap() else {
        panic!("expected a sealed block");
    };
    assert_eq!(block.transactions().len(), MAX_TRANSACTIONS);
    assert_eq!(miner.mempool().len(), 3);
    assert!(block.transactions()[0].is_reward());
    assert!(block.transactions()[1..].iter().all(|tx| !tx.is_reward()));
}

#[tokio::test]
async fn test_client_transaction_reaches_block_through_bus() {
    let bus = Arc::new(LocalBus::default());
    let (mut miner, _handle) = networked_miner(&bus, Chain::new(Target::MAX));
    let tx = transfer(&KeyPair::generate(), 5);

    bus.publish_message(Topic::ClientNotify, &BusMessage::NewTransaction(tx.clone()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let CycleOutcome::Sealed(block) = miner.mine_once().await.unwrap() else {
        panic!("expected a sealed block");
    };
    assert_eq!(block.transactions()[1], tx);
}

#[tokio::test]
async fn test_interrupted_attempt_returns_transactions_once() {
    let bus = Arc::new(LocalBus::default());
    // Only an all-zero hash would meet this target.
    let (mut miner, handle) = networked_miner(&bus, Chain::new(Target::from_bytes([0u8; 32])));
    let alice = KeyPair::generate();
    let pooled: Vec<Transaction> = (1..=3).map(|n| transfer(&alice, n)).collect();
    for tx in &pooled {
        handle.add_transaction(tx.clone()).unwrap();
    }

    let late = transfer(&alice, 4);
    let sender = handle.clone();
    let late_tx = late.clone();
    tokio::spawn(async move {
        sender.add_transaction(late_tx).unwrap();
    });

    assert!(matches!(
        miner.mine_once().await.unwrap(),
        CycleOutcome::Interrupted
    ));
    assert_eq!(miner.chain().height(), 0);

    let pool: Vec<&Transaction> = miner.mempool().iter().collect();
    assert_eq!(pool.len(), 4);
    assert!(pool.iter().all(|tx| !tx.is_reward()));
    for tx in pooled.iter().chain(std::iter::once(&late)) {
        assert_eq!(pool.iter().filter(|p| **p == tx).count(), 1);
    }
}

#[tokio::test]
async fn test_block_with_wrong_parent_is_ignored() {
    let bus = Arc::new(LocalBus::default());
    let (mut miner, _handle) = networked_miner(&bus, Chain::new(Target::MAX));
    miner.mine_once().await.unwrap();
    let tip = miner.chain().tip_hash().unwrap().to_string();

    let mut stray = Block::new(Some("ab".repeat(32)));
    stray.add_transaction(Transaction::reward(&KeyPair::generate().address(), 50, None, 1));
    let hash = stray.hash();
    stray.seal(hash.clone()).unwrap();
    bus.publish_message(Topic::MinerNotify, &BusMessage::NewBlock(stray))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    miner.mine_once().await.unwrap();
    let blocks = miner.chain().blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].prev_hash(), Some(tip.as_str()));
    assert!(blocks.iter().all(|b| b.block_hash() != Some(hash.as_str())));
}

#[tokio::test]
async fn test_second_miner_builds_on_first_miners_block() {
    let bus = Arc::new(LocalBus::default());
    let (mut first, _a) = networked_miner(&bus, Chain::new(Target::MAX));
    let (mut second, _b) = networked_miner(&bus, Chain::new(Target::MAX));

    let CycleOutcome::Sealed(block) = first.mine_once().await.unwrap() else {
        panic!("expected a sealed block");
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    second.mine_once().await.unwrap();
    let blocks = second.chain().blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], block);
    assert_eq!(blocks[1].prev_hash(), block.block_hash());

    // The first miner takes the second miner's block as well.
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.mine_once().await.unwrap();
    assert_eq!(first.chain().blocks()[1], blocks[1]);
    assert_eq!(first.chain().height(), 3);
}

#[tokio::test]
async fn test_new_miner_bootstraps_from_running_peer() {
    let bus = Arc::new(LocalBus::default());
    let (mut peer, peer_handle) = networked_miner(&bus, Chain::new(Target::MAX));
    peer.mine_once().await.unwrap();
    peer.mine_once().await.unwrap();
    let running = tokio::spawn(peer.run());

    let store = InMemoryStore::new();
    let (chain, source) = bootstrap_chain(bus.as_ref(), &store, Target::MAX, Duration::from_secs(2))
        .await
        .unwrap();

    peer_handle.shutdown().unwrap();
    let peer_chain = running.await.unwrap().unwrap();

    assert_eq!(source, ChainSource::Peer);
    assert!(chain.height() >= 2);
    assert_eq!(chain.blocks(), &peer_chain.blocks()[..chain.height()]);
}
