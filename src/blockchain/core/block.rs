use crate::error::ChainError;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};

/// Default cap on transactions per block, reward included.
pub const MAX_TRANSACTIONS: usize = 10;

pub type Sha256Hash = [u8; 32];

fn default_capacity() -> usize {
    MAX_TRANSACTIONS
}

/// A timestamped batch of transactions.
///
/// A block is *unsealed* until proof-of-work succeeds and [`Block::seal`]
/// records its hash; after that it is *sealed* and no longer changes.
/// The hash covers `(timestamp, nonce, transactions)` only; `prev_hash`
/// is carried alongside but is not part of the hashed domain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    timestamp: u64,
    nonce: u64,
    transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_hash: Option<String>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

impl Block {
    pub fn new(prev_hash: Option<String>) -> Self {
        Self::with_capacity(prev_hash, MAX_TRANSACTIONS)
    }

    pub fn with_capacity(prev_hash: Option<String>, capacity: usize) -> Self {
        Block {
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            nonce: 0,
            transactions: Vec::with_capacity(capacity),
            prev_hash,
            block_hash: None,
            capacity,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn prev_hash(&self) -> Option<&str> {
        self.prev_hash.as_deref()
    }

    pub fn block_hash(&self) -> Option<&str> {
        self.block_hash.as_deref()
    }

    pub fn is_sealed(&self) -> bool {
        self.block_hash.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= self.capacity
    }

    /// Appends `tx` unless the block is full or sealed. Returns whether it was added;
    /// callers must not assume success.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if self.is_sealed() || self.is_full() {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// Moves the timestamp past `earlier` so consecutive blocks never share one.
    pub(crate) fn stamp_after(&mut self, earlier: u64) {
        debug_assert!(!self.is_sealed());
        self.timestamp = self.timestamp.max(earlier.saturating_add(1));
    }

    /// Moves to the next nonce. When the nonce space is exhausted the
    /// timestamp is bumped and the search restarts at zero.
    pub(crate) fn advance_nonce(&mut self) {
        debug_assert!(!self.is_sealed());
        match self.nonce.checked_add(1) {
            Some(next) => self.nonce = next,
            None => {
                let now = chrono::Utc::now().timestamp_millis() as u64;
                self.timestamp = now.max(self.timestamp + 1);
                self.nonce = 0;
            }
        }
    }

    pub(crate) fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    pub fn digest(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update((self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            tx.hash_into(&mut hasher);
        }
        hasher.finalize().into()
    }

    /// Lowercase hex of [`Block::digest`].
    pub fn hash(&self) -> String {
        hex::encode(self.digest())
    }

    /// Records the proof-of-work hash. Sealing is irreversible.
    pub fn seal(&mut self, hash: String) -> Result<(), ChainError> {
        if self.is_sealed() {
            return Err(ChainError::AlreadySealed);
        }
        self.block_hash = Some(hash);
        Ok(())
    }

    /// Recomputes the hash and compares it with the sealed one.
    pub fn verify_hash(&self) -> Result<(), ChainError> {
        let asserted = self.block_hash.as_deref().ok_or(ChainError::UnsealedBlock)?;
        let recomputed = self.hash();
        if asserted != recomputed {
            return Err(ChainError::HashMismatch {
                asserted: asserted.to_string(),
                recomputed,
            });
        }
        Ok(())
    }
}
