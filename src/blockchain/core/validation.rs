use crate::blockchain::core::block::{Block, MAX_TRANSACTIONS};
use crate::blockchain::core::target::Target;
use crate::error::ChainError;

/// Checks that `block` is sealed, holds at most [`MAX_TRANSACTIONS`]
/// transactions, that its asserted hash recomputes, and that the hash meets
/// `target`.
pub fn validate_sealed_block(block: &Block, target: &Target) -> Result<(), ChainError> {
    let count = block.transactions().len();
    if count > MAX_TRANSACTIONS {
        return Err(ChainError::InvalidBlock(format!(
            "{} transactions exceed the limit of {}",
            count, MAX_TRANSACTIONS
        )));
    }
    block.verify_hash()?;
    let digest = block.digest();
    if !target.is_met_by(&digest) {
        return Err(ChainError::InvalidProofOfWork(hex::encode(digest)));
    }
    Ok(())
}

/// Checks that `block` builds directly on `tip`.
pub fn validate_linkage(tip: &Block, block: &Block) -> Result<(), ChainError> {
    let expected = tip.block_hash().ok_or(ChainError::UnsealedBlock)?;
    match block.prev_hash() {
        Some(prev) if prev == expected => Ok(()),
        other => Err(ChainError::InvalidBlockLinkage {
            expected: expected.to_string(),
            actual: other.unwrap_or("<none>").to_string(),
        }),
    }
}
