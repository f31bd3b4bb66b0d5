//! Process wiring for the RelayChain binaries
//!
//! Builds the bus, bootstraps the chain, turns inbound bus traffic into
//! [`MinerCommand`]s and handles Ctrl-C.

use crate::blockchain::{Chain, Target};
use crate::bus::ws::{self, WsBus};
use crate::bus::{BusMessage, LocalBus, MessageBus, Topic};
use crate::cli::resolve_miner_address;
use crate::config::{BusConfig, Config};
use crate::error::ChainError;
use crate::miner::{Miner, MinerCommand, MinerHandle};
use crate::persistence::{ChainStore, JsonChainFile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};

/// Where the starting chain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSource {
    Peer,
    File,
    Empty,
}

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(Level::INFO.as_str())),
        )
        .init();
}

/// Connects to the configured hub, or falls back to an in-process bus.
pub async fn connect_bus(config: &BusConfig) -> Result<Arc<dyn MessageBus>, ChainError> {
    match &config.hub_url {
        Some(url) => Ok(Arc::new(WsBus::connect(url).await?)),
        None => {
            info!("no hub configured, using in-process bus");
            Ok(Arc::new(LocalBus::default()))
        }
    }
}

/// Asks peers for their chain and waits up to `timeout` for a usable
/// snapshot on `setup-notify`. Falls back to the store when none arrives.
pub async fn bootstrap_chain(
    bus: &dyn MessageBus,
    store: &dyn ChainStore,
    target: Target,
    timeout: Duration,
) -> Result<(Chain, ChainSource), ChainError> {
    let mut replies = bus.subscribe(Topic::SetupNotify)?;
    bus.publish_message(Topic::MinerNotify, &BusMessage::RequestChain)?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let payload = match tokio::time::timeout_at(deadline, replies.recv()).await {
            Err(_) => break,
            Ok(Ok(payload)) => payload,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
        };
        match BusMessage::from_json(&payload) {
            Ok(BusMessage::ChainSnapshot(blocks)) if !blocks.is_empty() => {
                match Chain::from_blocks(blocks, target) {
                    Ok(chain) => {
                        info!(height = chain.height(), "chain loaded from peer snapshot");
                        return Ok((chain, ChainSource::Peer));
                    }
                    Err(e) => warn!(error = %e, "discarding invalid peer snapshot"),
                }
            }
            Ok(message) => debug!(kind = message.kind(), "ignoring setup-notify message"),
            Err(e) => debug!(error = %e, "discarding malformed setup-notify message"),
        }
    }

    match Chain::from_blocks(store.load_blocks(), target) {
        Ok(chain) if !chain.is_empty() => {
            info!(height = chain.height(), "chain loaded from file");
            Ok((chain, ChainSource::File))
        }
        Ok(chain) => Ok((chain, ChainSource::Empty)),
        Err(e) => {
            warn!(error = %e, "stored chain is invalid, starting empty");
            Ok((Chain::new(target), ChainSource::Empty))
        }
    }
}

/// Maps a bus message seen on `topic` to the miner command it implies.
pub fn route(topic: Topic, message: BusMessage) -> Option<MinerCommand> {
    match (topic, message) {
        (Topic::MinerNotify, BusMessage::RequestChain) => Some(MinerCommand::ChainRequested {
            reply_to: Topic::SetupNotify,
        }),
        (Topic::MinerNotify, BusMessage::NewBlock(block)) => Some(MinerCommand::RemoteBlock(block)),
        (Topic::ClientNotify, BusMessage::NewTransaction(tx)) => {
            Some(MinerCommand::AddTransaction(tx))
        }
        (Topic::ClientNotify, BusMessage::RequestChain) => Some(MinerCommand::ChainRequested {
            reply_to: Topic::ClientNotify,
        }),
        _ => None,
    }
}

/// Subscribes to `miner-notify` and `client-notify` and forwards what
/// arrives to the miner. Each router stops once the miner is gone.
pub fn spawn_miner_routers(
    bus: &dyn MessageBus,
    handle: MinerHandle,
) -> Result<Vec<JoinHandle<()>>, ChainError> {
    [Topic::MinerNotify, Topic::ClientNotify]
        .into_iter()
        .map(|topic| -> Result<JoinHandle<()>, ChainError> {
            let rx = bus.subscribe(topic)?;
            Ok(tokio::spawn(route_messages(rx, topic, handle.clone())))
        })
        .collect()
}

async fn route_messages(
    mut rx: broadcast::Receiver<String>,
    topic: Topic,
    handle: MinerHandle,
) {
    loop {
        let payload = match rx.recv().await {
            Ok(payload) => payload,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%topic, skipped = n, "router lagged behind the bus");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let message = match BusMessage::from_json(&payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(%topic, error = %e, "discarding malformed message");
                continue;
            }
        };
        if let Some(command) = route(topic, message) {
            if handle.send(command).is_err() {
                break;
            }
        }
    }
}

/// Runs a miner until Ctrl-C, then persists its chain.
pub async fn run_miner(config: Config) -> Result<(), ChainError> {
    let address = resolve_miner_address(&config.miner)?;
    let bus = connect_bus(&config.bus).await?;
    let store = JsonChainFile::new(&config.miner.chain_file);

    // Without a hub there is nobody to answer.
    let timeout = if config.bus.hub_url.is_some() {
        config.miner.bootstrap_timeout()
    } else {
        Duration::ZERO
    };
    let (chain, source) = bootstrap_chain(bus.as_ref(), &store, config.miner.target, timeout).await?;
    info!(?source, height = chain.height(), chain_file = %store.path().display(), "chain ready");

    let (miner, handle) = Miner::new(
        address,
        chain,
        config.miner.params(),
        bus.clone(),
        Box::new(store),
    );
    let routers = spawn_miner_routers(bus.as_ref(), handle.clone())?;

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_handle.shutdown();
        }
    });

    let result = miner.run().await;
    for router in routers {
        router.abort();
    }
    let chain = result?;
    info!(height = chain.height(), "miner stopped");
    Ok(())
}

/// Runs the balance service until Ctrl-C.
#[cfg(feature = "api")]
pub async fn run_server(config: Config, print_accounts: bool) -> Result<(), ChainError> {
    if config.bus.hub_url.is_none() {
        warn!("no hub configured, balances will only reflect local transfers");
    }
    let bus = connect_bus(&config.bus).await?;
    let service = crate::api::BalanceService::new(bus).with_account_printing(print_accounts);

    let follower = tokio::spawn(service.clone().follow_bus());
    let result = tokio::select! {
        served = crate::api::run_api_server(service, config.server.port) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };
    follower.abort();
    result
}

/// Runs a bus hub on `port` until Ctrl-C.
pub async fn run_hub(port: u16) -> Result<(), ChainError> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tokio::select! {
        served = ws::run_hub(listener) => served,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Block;
    use crate::persistence::InMemoryStore;
    use crate::transaction::Transaction;

    fn sealed(prev: Option<String>, stamp: u64) -> Block {
        let mut block = Block::new(prev);
        block.add_transaction(Transaction::reward("02aa", 50, None, stamp));
        let hash = block.hash();
        block.seal(hash).unwrap();
        block
    }

    #[test]
    fn test_routing_table() {
        let block = sealed(None, 1);
        assert!(matches!(
            route(Topic::MinerNotify, BusMessage::RequestChain),
            Some(MinerCommand::ChainRequested {
                reply_to: Topic::SetupNotify
            })
        ));
        assert!(matches!(
            route(Topic::ClientNotify, BusMessage::RequestChain),
            Some(MinerCommand::ChainRequested {
                reply_to: Topic::ClientNotify
            })
        ));
        assert!(matches!(
            route(Topic::MinerNotify, BusMessage::NewBlock(block.clone())),
            Some(MinerCommand::RemoteBlock(_))
        ));
        assert!(route(Topic::ClientNotify, BusMessage::NewBlock(block)).is_none());
        assert!(route(Topic::ClientNotify, BusMessage::ChainSnapshot(vec![])).is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_falls_back_to_store() {
        let bus = LocalBus::default();
        let store = InMemoryStore::with_blocks(vec![sealed(None, 1)]);

        let (chain, source) =
            bootstrap_chain(&bus, &store, Target::MAX, Duration::from_millis(20))
                .await
                .unwrap();
        assert_eq!(source, ChainSource::File);
        assert_eq!(chain.height(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_prefers_peer_snapshot() {
        let bus = LocalBus::default();
        let mut requests = bus.subscribe(Topic::MinerNotify).unwrap();
        let first = sealed(None, 1);
        let second = sealed(first.block_hash().map(str::to_string), 2);
        let snapshot = vec![first, second];

        let responder = bus.clone();
        let blocks = snapshot.clone();
        tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(BusMessage::from_json(&request).unwrap(), BusMessage::RequestChain);
            responder
                .publish_message(Topic::SetupNotify, &BusMessage::ChainSnapshot(vec![]))
                .unwrap();
            responder
                .publish_message(Topic::SetupNotify, &BusMessage::ChainSnapshot(blocks))
                .unwrap();
        });

        let store = InMemoryStore::with_blocks(vec![sealed(None, 9)]);
        let (chain, source) = bootstrap_chain(&bus, &store, Target::MAX, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(source, ChainSource::Peer);
        assert_eq!(chain.blocks(), &snapshot[..]);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_invalid_store() {
        let bus = LocalBus::default();
        let mut forged = Block::new(None);
        forged.seal("00".repeat(32)).unwrap();
        let store = InMemoryStore::with_blocks(vec![forged]);

        let (chain, source) = bootstrap_chain(&bus, &store, Target::MAX, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(source, ChainSource::Empty);
        assert!(chain.is_empty());
    }
}
