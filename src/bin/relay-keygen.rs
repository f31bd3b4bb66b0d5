#![forbid(unsafe_code)]
//! Generates a secp256k1 key pair for use as a RelayChain account

use clap::Parser;
use colored::*;
use relaychain::cli::KeygenCli;
use relaychain::crypto::KeyPair;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = KeygenCli::parse();
    let keypair = KeyPair::generate();

    if cli.json {
        let out = serde_json::json!({
            "secret_key": keypair.secret_hex(),
            "address": keypair.address(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "🔑 New RelayChain account".bright_cyan().bold());
    println!();
    println!("{} {}", "Address:   ".bright_white(), keypair.address().bright_green());
    println!("{} {}", "Secret key:".bright_white(), keypair.secret_hex().yellow());
    println!();
    println!(
        "{}",
        "Keep the secret key private. Start a miner with: relay-miner --key <secret key>".dimmed()
    );
    Ok(())
}
