#![forbid(unsafe_code)]
//! WebSocket message hub connecting RelayChain miners and balance services

use clap::Parser;
use relaychain::cli::HubCli;
use relaychain::config::load_config;
use relaychain::node::{init_tracing, run_hub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = HubCli::parse();
    init_tracing();

    let config = load_config(&cli.config)?;
    let port = cli.port.unwrap_or(config.bus.hub_port);

    run_hub(port).await?;
    Ok(())
}
