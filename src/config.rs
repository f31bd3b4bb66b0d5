//! Configuration management for RelayChain
//!
//! Values come from an optional TOML file; every field has a default so a
//! missing file yields a working solo-mining setup. Command-line flags are
//! applied on top by the binaries.

use crate::blockchain::{Target, MAX_TRANSACTIONS};
use crate::error::ChainError;
use crate::miner::MiningParams;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Hex compressed public key credited with block rewards.
    #[serde(default)]
    pub address: Option<String>,
    /// Hex secret key; the address is derived from it when `address` is unset.
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_chain_file")]
    pub chain_file: String,
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
    #[serde(default = "default_block_reward")]
    pub block_reward: u64,
    #[serde(default)]
    pub target: Target,
    /// Hash attempts between inbox drains.
    #[serde(default = "default_yield_every")]
    pub yield_every: u64,
    #[serde(default = "default_bootstrap_timeout_ms")]
    pub bootstrap_timeout_ms: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            address: None,
            secret_key: None,
            chain_file: default_chain_file(),
            max_transactions: default_max_transactions(),
            block_reward: default_block_reward(),
            target: Target::default(),
            yield_every: default_yield_every(),
            bootstrap_timeout_ms: default_bootstrap_timeout_ms(),
        }
    }
}

impl MinerConfig {
    pub fn params(&self) -> MiningParams {
        MiningParams {
            max_transactions: self.max_transactions,
            block_reward: self.block_reward,
            yield_every: self.yield_every,
        }
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// WebSocket URL of a `relay-hub`. Without one, an in-process bus is used.
    #[serde(default)]
    pub hub_url: Option<String>,
    #[serde(default = "default_hub_port")]
    pub hub_port: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            hub_url: None,
            hub_port: default_hub_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_chain_file() -> String {
    "chain.json".to_string()
}

fn default_max_transactions() -> usize {
    MAX_TRANSACTIONS
}

fn default_block_reward() -> u64 {
    50
}

fn default_yield_every() -> u64 {
    1_000
}

fn default_bootstrap_timeout_ms() -> u64 {
    2_000
}

fn default_hub_port() -> u16 {
    7070
}

fn default_api_port() -> u16 {
    3042
}

/// Reads `path` if it exists, otherwise falls back to defaults, then validates.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::ConfigError(format!("{}: {}", path.display(), e)))?
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.miner.chain_file.is_empty() {
            return Err(ChainError::ConfigError(
                "miner.chain_file must not be empty".to_string(),
            ));
        }
        if self.miner.max_transactions == 0 {
            return Err(ChainError::ConfigError(
                "miner.max_transactions must leave room for the reward".to_string(),
            ));
        }
        if self.miner.max_transactions > MAX_TRANSACTIONS {
            return Err(ChainError::ConfigError(format!(
                "miner.max_transactions must not exceed {}, peers reject larger blocks",
                MAX_TRANSACTIONS
            )));
        }
        if self.miner.yield_every == 0 {
            return Err(ChainError::ConfigError(
                "miner.yield_every must be at least 1".to_string(),
            ));
        }
        if let Some(address) = &self.miner.address {
            crate::crypto::validate_address(address)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.miner.max_transactions, MAX_TRANSACTIONS);
        assert_eq!(config.miner.target, Target::default());
        assert_eq!(config.server.port, 3042);
        assert!(config.bus.hub_url.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[miner]
chain_file = "data/chain.json"
target = "0fff"
max_transactions = 4

[bus]
hub_url = "ws://127.0.0.1:9000"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.miner.chain_file, "data/chain.json");
        assert_eq!(config.miner.max_transactions, 4);
        assert_eq!(config.miner.target, Target::from_hex("0fff").unwrap());
        assert_eq!(config.miner.block_reward, 50);
        assert_eq!(config.bus.hub_url.as_deref(), Some("ws://127.0.0.1:9000"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "[miner]\nmax_transactions = 0\n").unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[miner]\nmax_transactions = 11\n").unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[miner]\naddress = \"not-a-key\"\n").unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[miner]\ntarget = \"xyz\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
