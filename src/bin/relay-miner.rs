#![forbid(unsafe_code)]
//! Proof-of-work miner for RelayChain

use clap::Parser;
use relaychain::cli::MinerCli;
use relaychain::config::load_config;
use relaychain::node::{init_tracing, run_miner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = MinerCli::parse();
    init_tracing();

    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config)?;

    run_miner(config).await?;
    Ok(())
}
