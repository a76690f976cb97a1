use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use ibex_core::KeyPair;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod node;
mod producer;

use cli::{Cli, Commands};
use config::{generate_sample_config, NodeConfig};
use node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run_node(&config).await?;
        }
        Commands::Init { output, validators } => {
            init_logging("info");
            init_config(&output, validators)?;
        }
        Commands::Keygen { output } => {
            init_logging("info");
            generate_keypair(output)?;
        }
        Commands::Status { endpoint, validator } => {
            init_logging("info");
            show_status(&endpoint, validator).await?;
        }
    }

    Ok(())
}

/// Install the global subscriber; `RUST_LOG` wins over `level`
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Run the configured devnet
async fn run_node(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        init_logging("info");
        bail!(
            "Configuration file not found: {}. Run 'ibex init' to create one.",
            config_path.display()
        );
    }

    let config = NodeConfig::load(config_path)?;
    init_logging(&config.log_level);
    info!("Loaded configuration from {:?}", config_path);

    Node::new(config)?.run().await
}

/// Initialize a new configuration file
fn init_config(output: &Path, validators: usize) -> Result<()> {
    if validators == 0 {
        bail!("A devnet needs at least one validator");
    }

    let config = generate_sample_config(validators);
    config.save(output)?;

    info!("Configuration saved to {:?}", output);
    for keys in config.validator_keypairs()? {
        info!("  Validator: {}", keys.address);
    }

    println!("\nConfiguration file created: {}", output.display());
    println!("Tolerates {} faulty validator(s).", (validators - 1) / 3);
    println!("\nTo start the devnet, run:");
    println!("  ibex run --config {}", output.display());

    Ok(())
}

/// Generate a new validator key
fn generate_keypair(output: Option<PathBuf>) -> Result<()> {
    let keypair = KeyPair::generate();

    println!("Generated new validator key:");
    println!("  Address:     {}", keypair.address);
    println!("  Public key:  {}", keypair.public.to_hex());
    println!("  Secret key:  {}", keypair.secret.to_hex());

    if let Some(path) = output {
        std::fs::write(&path, keypair.secret.to_hex())?;
        info!("Secret key saved to {:?}", path);
    }

    println!("\nWARNING: Keep your secret key safe! Do not share it with anyone.");

    Ok(())
}

/// Show consensus status over RPC
async fn show_status(endpoint: &str, validator: Option<usize>) -> Result<()> {
    let url = match validator {
        Some(index) => format!("{}/status/{}", endpoint, index),
        None => format!("{}/status", endpoint),
    };

    let response = reqwest::get(&url).await?;
    let status = response.status();
    let body: serde_json::Value = response.json().await?;

    if !status.is_success() {
        bail!("Failed to get status ({}): {}", status, body["error"]);
    }

    println!("Consensus Status:");
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
