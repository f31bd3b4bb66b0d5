//! Account balances derived from the chain
//!
//! The ledger replays blocks in order: a reward credits its recipient, a
//! transfer debits the sender and credits the recipient. A transfer the
//! sender cannot cover has no effect. Transfers accepted
//! through the HTTP API are applied immediately; when the same transaction
//! later shows up inside a block it is recognised by its `message_hash` and
//! not applied twice.

use crate::blockchain::Block;
use crate::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Balance too low")]
    InsufficientBalance,
    #[error("Public key does not match signature")]
    InvalidSignature,
    #[error("Transaction already applied")]
    Duplicate,
}

#[derive(Debug, Clone, Default)]
pub struct BalanceLedger {
    balances: HashMap<String, u64>,
    applied: HashSet<String>,
    blocks_seen: usize,
    synced: bool,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `address`; unknown accounts hold nothing.
    pub fn balance(&self, address: &str) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// All known accounts, sorted by address.
    pub fn accounts(&self) -> Vec<(String, u64)> {
        let mut accounts: Vec<(String, u64)> = self
            .balances
            .iter()
            .map(|(address, balance)| (address.clone(), *balance))
            .collect();
        accounts.sort();
        accounts
    }

    pub fn blocks_seen(&self) -> usize {
        self.blocks_seen
    }

    /// Whether a chain snapshot has been loaded.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Discards all state and replays `blocks` from genesis.
    pub fn load_snapshot(&mut self, blocks: &[Block]) {
        self.balances.clear();
        self.applied.clear();
        self.blocks_seen = 0;
        for block in blocks {
            self.apply_block(block);
        }
        self.synced = true;
    }

    /// Applies every transaction in `block` not already seen. Returns how
    /// many were applied.
    ///
    /// Transfers the sender cannot cover are retried while other
    /// transactions in the block still change balances, then dropped.
    pub fn apply_block(&mut self, block: &Block) -> usize {
        self.blocks_seen += 1;
        let mut pending: Vec<&Transaction> = block
            .transactions()
            .iter()
            .filter(|tx| !self.applied.contains(&tx.message_hash))
            .collect();

        let mut applied = 0;
        loop {
            let before = pending.len();
            pending.retain(|tx| !self.apply(tx));
            if pending.len() == before {
                break;
            }
            applied += before - pending.len();
        }

        for tx in pending {
            if self.applied.insert(tx.message_hash.clone()) {
                debug!(
                    sender = %tx.sender,
                    amount = tx.amount,
                    "skipping transfer the sender cannot cover"
                );
            }
        }
        applied
    }

    /// Validates a client transfer and applies it right away.
    ///
    /// The balance is checked before the signature. Returns the sender's
    /// new balance. On error nothing changes.
    pub fn transfer(&mut self, tx: &Transaction) -> Result<u64, TransferError> {
        if self.applied.contains(&tx.message_hash) {
            return Err(TransferError::Duplicate);
        }
        if self.balance(&tx.sender) < tx.amount {
            return Err(TransferError::InsufficientBalance);
        }
        tx.validate_signature()
            .map_err(|_| TransferError::InvalidSignature)?;

        self.apply(tx);
        Ok(self.balance(&tx.sender))
    }

    fn apply(&mut self, tx: &Transaction) -> bool {
        if self.applied.contains(&tx.message_hash) {
            return false;
        }
        if !tx.is_reward() {
            match self.balances.get_mut(&tx.sender) {
                Some(sender) if *sender >= tx.amount => *sender -= tx.amount,
                _ if tx.amount == 0 => {}
                _ => return false,
            }
        }
        let recipient = self.balances.entry(tx.recipient.clone()).or_insert(0);
        *recipient = recipient.saturating_add(tx.amount);
        self.applied.insert(tx.message_hash.clone());
        true
    }
}
