/// Transaction types for RelayChain
use crate::crypto::{sha256_hex, Address, KeyPair};
use crate::error::ChainError;
use sha2::{Digest, Sha256};

/// A value transfer recorded in a block.
///
/// Reward transactions credit the miner and have `sender == recipient`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: u64,
    pub message_hash: String,
    pub signature: String,
}

impl Transaction {
    /// Builds the reward transaction a miner places first in its candidate block.
    ///
    /// `parent` is the hash of the block being extended, `None` for genesis.
    pub fn reward(miner: &str, amount: u64, parent: Option<&str>, timestamp: u64) -> Self {
        let message_hash = sha256_hex(
            format!(
                "REWARD:{}:{}:{}:{}",
                miner,
                amount,
                parent.unwrap_or("genesis"),
                timestamp
            )
            .as_bytes(),
        );
        Transaction {
            sender: miner.to_string(),
            recipient: miner.to_string(),
            amount,
            message_hash,
            signature: String::new(),
        }
    }

    /// Builds and signs a transfer from `keypair`'s account.
    pub fn signed_transfer(
        keypair: &KeyPair,
        recipient: &str,
        amount: u64,
    ) -> Result<Self, ChainError> {
        let sender = keypair.address();
        let message = Self::signable_message(&sender, recipient, amount);
        let (message_hash, signature) = keypair.sign(&message)?;
        Ok(Transaction {
            sender,
            recipient: recipient.to_string(),
            amount,
            message_hash,
            signature,
        })
    }

    pub fn signable_message(sender: &str, recipient: &str, amount: u64) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice("TRANSFER:".as_bytes());
        message.extend_from_slice(sender.as_bytes());
        message.extend_from_slice(recipient.as_bytes());
        message.extend_from_slice(&amount.to_le_bytes());
        message
    }

    pub fn is_reward(&self) -> bool {
        self.sender == self.recipient
    }

    /// Feeds every field into `hasher`, length-prefixing the variable-size ones.
    pub fn hash_into(&self, hasher: &mut Sha256) {
        for field in [&self.sender, &self.recipient] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(self.amount.to_le_bytes());
        for field in [&self.message_hash, &self.signature] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        self.hash_into(&mut hasher);
        hasher.finalize().into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }
}
