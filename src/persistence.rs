//! Chain persistence
//!
//! The chain is stored as a JSON array of sealed blocks. Reads are forgiving
//! (a missing or unreadable file means "no prior state"); writes go through a
//! temporary file in the same directory and are renamed into place.

use crate::blockchain::Block;
use crate::error::ChainError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Abstraction for chain storage backends.
pub trait ChainStore: Send + Sync {
    /// Loads the persisted block sequence. Backends return an empty list when
    /// nothing usable is stored.
    fn load_blocks(&self) -> Vec<Block>;

    /// Replaces the stored block sequence atomically.
    fn save_blocks(&self, blocks: &[Block]) -> Result<(), ChainError>;
}

pub struct JsonChainFile {
    path: PathBuf,
}

impl JsonChainFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonChainFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Block>, ChainError> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ChainStore for JsonChainFile {
    fn load_blocks(&self) -> Vec<Block> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no chain file, starting empty");
            return Vec::new();
        }
        match self.read() {
            Ok(blocks) => {
                info!(path = %self.path.display(), height = blocks.len(), "loaded chain file");
                blocks
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable chain file, starting empty");
                Vec::new()
            }
        }
    }

    fn save_blocks(&self, blocks: &[Block]) -> Result<(), ChainError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(blocks)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| {
            ChainError::PersistenceError(format!(
                "Failed to move chain file into {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(path = %self.path.display(), height = blocks.len(), "chain file written");
        Ok(())
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pub blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        InMemoryStore {
            blocks: Arc::new(Mutex::new(blocks)),
        }
    }
}

impl ChainStore for InMemoryStore {
    fn load_blocks(&self) -> Vec<Block> {
        self.blocks.lock().map(|b| b.clone()).unwrap_or_default()
    }

    fn save_blocks(&self, blocks: &[Block]) -> Result<(), ChainError> {
        let mut stored = self
            .blocks
            .lock()
            .map_err(|_| ChainError::PersistenceError("Mutex poisoned".to_string()))?;
        *stored = blocks.to_vec();
        Ok(())
    }
}
