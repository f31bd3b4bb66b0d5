//! The mining loop
//!
//! A [`Miner`] exclusively owns the chain and the mempool. Everything else
//! talks to it through a [`MinerHandle`], whose commands are drained between
//! hash batches. A command that changes the pool or extends the chain makes
//! the in-progress attempt stale: the candidate is abandoned, its
//! transactions go back to the pool and a fresh candidate is built.

use crate::blockchain::{Block, Chain, Reconciliation, MAX_TRANSACTIONS};
use crate::bus::{BusMessage, MessageBus, Topic};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::persistence::ChainStore;
use crate::transaction::Transaction;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

/// Tunables for block construction and the nonce search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningParams {
    /// Transactions per block, reward included.
    pub max_transactions: usize,
    pub block_reward: u64,
    /// Hash attempts between inbox drains.
    pub yield_every: u64,
}

impl Default for MiningParams {
    fn default() -> Self {
        MiningParams {
            max_transactions: MAX_TRANSACTIONS,
            block_reward: 50,
            yield_every: 1_000,
        }
    }
}

/// Intents queued for the mining task.
#[derive(Debug, Clone)]
pub enum MinerCommand {
    AddTransaction(Transaction),
    RemoteBlock(Block),
    /// Publish the current chain as a `ChainSnapshot` on `reply_to`.
    ChainRequested { reply_to: Topic },
    Shutdown,
}

/// Cloneable sender side of the miner inbox.
#[derive(Debug, Clone)]
pub struct MinerHandle {
    inbox: mpsc::UnboundedSender<MinerCommand>,
}

impl MinerHandle {
    pub fn send(&self, command: MinerCommand) -> Result<(), ChainError> {
        self.inbox
            .send(command)
            .map_err(|_| ChainError::MinerStopped)
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        self.send(MinerCommand::AddTransaction(tx))
    }

    pub fn remote_block(&self, block: Block) -> Result<(), ChainError> {
        self.send(MinerCommand::RemoteBlock(block))
    }

    pub fn request_chain(&self, reply_to: Topic) -> Result<(), ChainError> {
        self.send(MinerCommand::ChainRequested { reply_to })
    }

    pub fn shutdown(&self) -> Result<(), ChainError> {
        self.send(MinerCommand::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningState {
    Building,
    Searching,
    Sealed,
    Interrupted,
}

/// How a nonce search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Hex hash meeting the target.
    Found(String),
    Interrupted,
    Shutdown,
}

/// Result of one [`Miner::mine_once`] cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Sealed(Block),
    Interrupted,
    Shutdown,
}

pub struct Miner {
    address: String,
    params: MiningParams,
    chain: Chain,
    mempool: Mempool,
    bus: Arc<dyn MessageBus>,
    store: Box<dyn ChainStore>,
    inbox: mpsc::UnboundedReceiver<MinerCommand>,
    state: MiningState,
    /// Message hashes of transactions in peer blocks accepted since the last build.
    included: HashSet<String>,
    shutdown: bool,
}

impl Miner {
    pub fn new(
        address: String,
        chain: Chain,
        params: MiningParams,
        bus: Arc<dyn MessageBus>,
        store: Box<dyn ChainStore>,
    ) -> (Self, MinerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let miner = Miner {
            address,
            params,
            chain,
            mempool: Mempool::new(),
            bus,
            store,
            inbox: rx,
            state: MiningState::Building,
            included: HashSet::new(),
            shutdown: false,
        };
        (miner, MinerHandle { inbox: tx })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn state(&self) -> MiningState {
        self.state
    }

    /// Starts a new attempt: the reward first, then pooled transactions
    /// newest-first until the block is full. Pending commands are applied
    /// beforehand and the interruption flags are reset.
    pub fn build_candidate(&mut self) -> Block {
        self.state = MiningState::Building;
        self.drain_inbox();
        self.mempool.clear_dirty();
        self.chain.clear_updated();
        self.included.clear();

        let prev_hash = self.chain.tip_hash().map(str::to_string);
        let mut block = Block::with_capacity(prev_hash.clone(), self.params.max_transactions);
        if let Some(tip) = self.chain.tip() {
            block.stamp_after(tip.timestamp());
        }
        let reward = Transaction::reward(
            &self.address,
            self.params.block_reward,
            prev_hash.as_deref(),
            block.timestamp(),
        );
        block.add_transaction(reward);

        while !block.is_full() {
            match self.mempool.take() {
                Some(tx) => {
                    block.add_transaction(tx);
                }
                None => break,
            }
        }
        block
    }

    /// Walks nonces until the block hash meets the chain target.
    ///
    /// After every `yield_every` attempts the task yields, drains the inbox
    /// and checks the interruption flags. A hash found within a batch is
    /// only reported if nothing arrived to invalidate it.
    pub async fn search(&mut self, block: &mut Block) -> SearchOutcome {
        self.state = MiningState::Searching;
        let target = *self.chain.target();

        loop {
            let mut found = None;
            for _ in 0..self.params.yield_every {
                let digest = block.digest();
                if target.is_met_by(&digest) {
                    found = Some(hex::encode(digest));
                    break;
                }
                block.advance_nonce();
            }

            tokio::task::yield_now().await;
            self.drain_inbox();

            if self.shutdown {
                return SearchOutcome::Shutdown;
            }
            if self.mempool.is_dirty() || self.chain.is_updated() {
                return SearchOutcome::Interrupted;
            }
            if let Some(hash) = found {
                return SearchOutcome::Found(hash);
            }
        }
    }

    /// One build/search cycle.
    pub async fn mine_once(&mut self) -> Result<CycleOutcome, ChainError> {
        let mut block = self.build_candidate();
        if self.shutdown {
            self.recycle(block);
            return Ok(CycleOutcome::Shutdown);
        }

        match self.search(&mut block).await {
            SearchOutcome::Found(hash) => {
                block.seal(hash)?;
                self.chain.append(block.clone());
                self.state = MiningState::Sealed;
                info!(
                    height = self.chain.height(),
                    hash = block.block_hash().unwrap_or_default(),
                    nonce = block.nonce(),
                    txs = block.transactions().len(),
                    "sealed block"
                );
                self.announce(&block);
                Ok(CycleOutcome::Sealed(block))
            }
            SearchOutcome::Interrupted => {
                self.state = MiningState::Interrupted;
                let restored = self.recycle(block);
                info!(
                    restored,
                    pool = self.mempool.len(),
                    chain_updated = self.chain.is_updated(),
                    "mining attempt interrupted"
                );
                Ok(CycleOutcome::Interrupted)
            }
            SearchOutcome::Shutdown => {
                self.recycle(block);
                Ok(CycleOutcome::Shutdown)
            }
        }
    }

    /// Mines until a shutdown command arrives, then writes the chain through
    /// the store. A failed write is returned to the caller.
    pub async fn run(mut self) -> Result<Chain, ChainError> {
        info!(
            address = %self.address,
            height = self.chain.height(),
            target = %self.chain.target(),
            "miner started"
        );

        loop {
            if let CycleOutcome::Shutdown = self.mine_once().await? {
                break;
            }
        }

        info!(height = self.chain.height(), "miner stopping, persisting chain");
        self.persist()?;
        Ok(self.chain)
    }

    pub fn persist(&self) -> Result<(), ChainError> {
        self.store.save_blocks(self.chain.blocks())
    }

    fn drain_inbox(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle_command(&mut self, command: MinerCommand) {
        match command {
            MinerCommand::AddTransaction(tx) => {
                debug!(hash = %tx.message_hash, amount = tx.amount, "transaction queued");
                self.mempool.add(tx);
            }
            MinerCommand::RemoteBlock(block) => self.reconcile(block),
            MinerCommand::ChainRequested { reply_to } => {
                let snapshot = BusMessage::ChainSnapshot(self.chain.blocks().to_vec());
                match self.bus.publish_message(reply_to, &snapshot) {
                    Ok(()) => debug!(topic = %reply_to, height = self.chain.height(), "sent chain snapshot"),
                    Err(e) => warn!(topic = %reply_to, error = %e, "failed to send chain snapshot"),
                }
            }
            MinerCommand::Shutdown => {
                info!("shutdown requested");
                self.shutdown = true;
            }
        }
    }

    fn reconcile(&mut self, block: Block) {
        let hashes: HashSet<String> = block
            .transactions()
            .iter()
            .map(|tx| tx.message_hash.clone())
            .collect();
        let reported = block.block_hash().unwrap_or_default().to_string();

        match self.chain.try_accept_remote(block) {
            Ok(Reconciliation::Accepted) => {
                let dropped = self.mempool.discard(&hashes);
                self.included.extend(hashes);
                info!(
                    height = self.chain.height(),
                    hash = %reported,
                    dropped,
                    "accepted block from peer"
                );
            }
            Ok(Reconciliation::DuplicateEcho) => {
                debug!(hash = %reported, "ignoring echo of known block");
            }
            Err(e @ ChainError::InvalidBlockLinkage { .. }) => {
                debug!(hash = %reported, error = %e, "peer block does not extend our tip");
            }
            Err(e) => {
                warn!(hash = %reported, error = %e, "rejected peer block");
            }
        }
    }

    /// Returns the non-reward transactions of an abandoned candidate to the
    /// pool in reverse, so the pool's order is as it was before the build.
    /// Transactions already confirmed by a peer block are not restored.
    fn recycle(&mut self, block: Block) -> usize {
        let mut restored = 0;
        for tx in block.into_transactions().into_iter().skip(1).rev() {
            if self.included.contains(&tx.message_hash) {
                continue;
            }
            self.mempool.restore(tx);
            restored += 1;
        }
        restored
    }

    fn announce(&self, block: &Block) {
        let message = BusMessage::NewBlock(block.clone());
        for topic in [Topic::MinerNotify, Topic::ClientNotify] {
            if let Err(e) = self.bus.publish_message(topic, &message) {
                warn!(%topic, error = %e, "failed to publish block");
            }
        }
    }
}
