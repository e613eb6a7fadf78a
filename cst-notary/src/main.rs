//! CST Notary Server entry point

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use cst_notary::config::WALLET_PASSWORD_ENV;
use cst_notary::{NotaryConfig, NotaryServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("notary.toml")
    };

    // Load configuration
    let config = if config_path.exists() {
        NotaryConfig::from_file(&config_path)?
    } else {
        eprintln!("Configuration file not found: {}", config_path.display());
        eprintln!("Creating default configuration...");
        let config = NotaryConfig::default();
        config.to_file(&config_path)?;
        eprintln!("Default configuration saved to {}", config_path.display());
        eprintln!(
            "Please set the node, contract and wallet, and {} if the wallet key is encrypted",
            WALLET_PASSWORD_ENV
        );
        std::process::exit(1);
    };

    // Create and run server
    let server = NotaryServer::new(config)?;
    server.run().await?;

    Ok(())
}
