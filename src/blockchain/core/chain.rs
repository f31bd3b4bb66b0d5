use crate::blockchain::core::block::Block;
use crate::blockchain::core::target::Target;
use crate::blockchain::core::validation::{validate_linkage, validate_sealed_block};
use crate::error::ChainError;

/// What happened to a block reported by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Appended to the chain; the miner must abandon its current attempt.
    Accepted,
    /// Hash already present in the chain, typically our own publication coming back.
    DuplicateEcho,
}

/// Ordered sequence of sealed blocks. Index 0 is genesis; every later block
/// links to its predecessor through `prev_hash`.
///
/// There is no fork choice: the first valid block that extends the local tip
/// wins, and a peer building on a different tip is rejected.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    target: Target,
    updated: bool,
}

impl Chain {
    pub fn new(target: Target) -> Self {
        Chain {
            blocks: Vec::new(),
            target,
            updated: false,
        }
    }

    /// Rebuilds a chain from a persisted or peer-supplied block list,
    /// validating every block and link.
    pub fn from_blocks(blocks: Vec<Block>, target: Target) -> Result<Self, ChainError> {
        for (i, block) in blocks.iter().enumerate() {
            validate_sealed_block(block, &target)
                .map_err(|e| ChainError::InvalidBlock(format!("block {}: {}", i, e)))?;
            if i > 0 {
                validate_linkage(&blocks[i - 1], block)
                    .map_err(|e| ChainError::InvalidBlock(format!("block {}: {}", i, e)))?;
            }
        }
        Ok(Chain {
            blocks,
            target,
            updated: false,
        })
    }

    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn tip_hash(&self) -> Option<&str> {
        self.tip().and_then(|b| b.block_hash())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Appends a locally mined block without validation.
    pub fn append(&mut self, block: Block) {
        debug_assert!(block.is_sealed());
        self.blocks.push(block);
    }

    /// Reconciles a block reported by a peer against the local tip.
    ///
    /// Rejections leave the chain untouched. On acceptance the `updated`
    /// flag is raised for the mining loop to observe.
    pub fn try_accept_remote(&mut self, block: Block) -> Result<Reconciliation, ChainError> {
        if let Some(reported) = block.block_hash() {
            // Scanning from the tip finds an echo of the latest block at once.
            if self
                .blocks
                .iter()
                .rev()
                .any(|known| known.block_hash() == Some(reported))
            {
                return Ok(Reconciliation::DuplicateEcho);
            }
        }

        validate_sealed_block(&block, &self.target)?;

        if let Some(tip) = self.tip() {
            validate_linkage(tip, &block)?;
        }

        self.blocks.push(block);
        self.updated = true;
        Ok(Reconciliation::Accepted)
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }
}
