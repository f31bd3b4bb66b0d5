//! Command-line definitions shared by the RelayChain binaries

use crate::blockchain::Target;
use crate::config::{Config, MinerConfig, DEFAULT_CONFIG_PATH};
use crate::crypto::{validate_address, KeyPair};
use crate::error::ChainError;
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relay-miner", author, version, about = "Proof-of-work miner for RelayChain")]
pub struct MinerCli {
    /// Hex public key credited with block rewards
    #[arg(long, conflicts_with = "key")]
    pub address: Option<String>,

    /// Hex secret key; the reward address is derived from it
    #[arg(long)]
    pub key: Option<String>,

    /// Chain file loaded at start and written at shutdown
    #[arg(long)]
    pub chain_file: Option<String>,

    /// WebSocket URL of a relay-hub (solo mining when omitted)
    #[arg(long)]
    pub hub: Option<String>,

    /// Proof-of-work target as hex
    #[arg(long)]
    pub target: Option<String>,

    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl MinerCli {
    /// Overrides file values with the flags that were given.
    pub fn apply(&self, config: &mut Config) -> Result<(), ChainError> {
        if let Some(address) = &self.address {
            validate_address(address)?;
            config.miner.address = Some(address.clone());
            config.miner.secret_key = None;
        }
        if let Some(key) = &self.key {
            config.miner.secret_key = Some(key.clone());
            config.miner.address = None;
        }
        if let Some(chain_file) = &self.chain_file {
            config.miner.chain_file = chain_file.clone();
        }
        if let Some(hub) = &self.hub {
            config.bus.hub_url = Some(hub.clone());
        }
        if let Some(target) = &self.target {
            config.miner.target = Target::from_hex(target)?;
        }
        config.validate()
    }
}

#[derive(Parser, Debug)]
#[command(name = "relay-server", author, version, about = "HTTP balance service for RelayChain")]
pub struct ServerCli {
    #[arg(short, long)]
    pub port: Option<u16>,

    /// WebSocket URL of a relay-hub
    #[arg(long)]
    pub hub: Option<String>,

    /// Do not print the account table on updates
    #[arg(short, long)]
    pub quiet: bool,

    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl ServerCli {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(hub) = &self.hub {
            config.bus.hub_url = Some(hub.clone());
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "relay-hub", author, version, about = "WebSocket message hub for RelayChain")]
pub struct HubCli {
    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "relay-keygen", author, version, about = "Generate a RelayChain key pair")]
pub struct KeygenCli {
    /// Print the key pair as JSON
    #[arg(long)]
    pub json: bool,
}

/// The miner's reward address: the configured address, or the one derived
/// from the configured secret key.
pub fn resolve_miner_address(config: &MinerConfig) -> Result<String, ChainError> {
    if let Some(address) = &config.address {
        validate_address(address)?;
        return Ok(address.clone());
    }
    if let Some(key) = &config.secret_key {
        return Ok(KeyPair::from_secret_hex(key)?.address());
    }
    Err(ChainError::ConfigError(
        "a miner address or secret key is required (--address or --key)".to_string(),
    ))
}

/// Renders `(address, balance)` rows as a table.
pub fn accounts_table(accounts: &[(String, u64)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Account").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
            Cell::new("Balance").add_attribute(Attribute::Bold).fg(TableColor::Cyan),
        ]);

    for (i, (address, balance)) in accounts.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(address),
            Cell::new(balance).fg(TableColor::Green),
        ]);
    }
    table
}
