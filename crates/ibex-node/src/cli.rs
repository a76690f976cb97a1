use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Ibex - Byzantine fault tolerant consensus node
#[derive(Parser)]
#[command(name = "ibex")]
#[command(about = "Ibex consensus node and utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a devnet of every configured validator
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Initialize a new node configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Number of validator keys to generate
        #[arg(long, default_value_t = 4)]
        validators: usize,
    },

    /// Generate a new validator key
    Keygen {
        /// Output file for secret key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show consensus status of a running node
    Status {
        /// RPC endpoint
        #[arg(short, long, default_value = "http://127.0.0.1:8080")]
        endpoint: String,

        /// Devnet validator index (defaults to the first)
        #[arg(short, long)]
        validator: Option<usize>,
    },
}
