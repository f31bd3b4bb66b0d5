//! Pending-transaction pool
//!
//! Transactions are taken most-recently-added first. The `dirty` flag records
//! that an external submission arrived since the miner last built a block,
//! which is the signal that interrupts an in-progress proof-of-work search.

use crate::transaction::Transaction;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
    dirty: bool,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an externally submitted transaction and marks the pool dirty.
    pub fn add(&mut self, tx: Transaction) {
        self.transactions.push(tx);
        self.dirty = true;
    }

    /// Removes the most recently added transaction.
    pub fn take(&mut self) -> Option<Transaction> {
        self.transactions.pop()
    }

    /// Returns a transaction from an abandoned block without marking the pool dirty.
    pub fn restore(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Drops every pending transaction whose `message_hash` is in `included`.
    /// Used after a peer's block is accepted. Returns how many were dropped.
    pub fn discard(&mut self, included: &HashSet<String>) -> usize {
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| !included.contains(&tx.message_hash));
        before - self.transactions.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Iterates from the oldest to the newest pending transaction.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }
}
