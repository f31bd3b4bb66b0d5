//! Error types for RelayChain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Invalid block linkage: expected previous hash {expected}, got {actual}")]
    InvalidBlockLinkage { expected: String, actual: String },

    #[error("Block hash mismatch: asserted {asserted}, recomputed {recomputed}")]
    HashMismatch { asserted: String, recomputed: String },

    #[error("Invalid proof of work: {0} is above the target")]
    InvalidProofOfWork(String),

    #[error("Block is not sealed")]
    UnsealedBlock,

    #[error("Block is already sealed")]
    AlreadySealed,

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Miner has stopped")]
    MinerStopped,

    #[error("Bus error: {0}")]
    BusError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::PersistenceError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
