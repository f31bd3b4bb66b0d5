#![forbid(unsafe_code)]
//! HTTP balance service for RelayChain

use clap::Parser;
use relaychain::cli::ServerCli;
use relaychain::config::load_config;
use relaychain::node::{init_tracing, run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = ServerCli::parse();
    init_tracing();

    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config);

    run_server(config, !cli.quiet).await?;
    Ok(())
}
