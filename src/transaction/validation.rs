/// Signature checks for transactions, used by the balance service
use crate::crypto::{sha256_hex, verify_signature};
use crate::error::ChainError;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Checks that `message_hash` commits to the sender, recipient and amount,
    /// then verifies `signature` over it against the sender's public key.
    /// Reward transactions carry no signature and are never submitted by clients.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        if self.is_reward() {
            return Err(ChainError::CryptoError(
                "Reward transactions cannot be submitted".to_string(),
            ));
        }
        if self.signature.is_empty() {
            return Err(ChainError::CryptoError("Transaction not signed".to_string()));
        }
        let expected = sha256_hex(&Self::signable_message(
            &self.sender,
            &self.recipient,
            self.amount,
        ));
        if !expected.eq_ignore_ascii_case(&self.message_hash) {
            return Err(ChainError::CryptoError(
                "Message hash does not match transfer".to_string(),
            ));
        }
        verify_signature(&self.sender, &self.message_hash, &self.signature)
    }
}
