use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ibex_consensus::Config;
use ibex_core::{KeyPair, SecretKey};
use ibex_rpc::RpcConfig;
use serde::{Deserialize, Serialize};

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node data directory; each validator persists under `<data_dir>/<address>`
    pub data_dir: PathBuf,

    /// RPC bind address
    pub rpc_addr: SocketAddr,

    /// Enable WebSocket
    pub enable_ws: bool,

    /// Default log level, overridden by `RUST_LOG`
    pub log_level: String,

    /// Genesis block timestamp in milliseconds
    pub genesis_timestamp: u64,

    /// Consensus engine settings shared by every validator
    pub consensus: Config,

    /// Validator secret keys (hex)
    pub validator_keys: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let rpc = RpcConfig::default();
        NodeConfig {
            data_dir: PathBuf::from("./ibex-data"),
            rpc_addr: rpc.http_addr,
            enable_ws: rpc.enable_ws,
            log_level: "info".to_string(),
            genesis_timestamp: 0,
            consensus: Config::default(),
            validator_keys: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            http_addr: self.rpc_addr,
            enable_ws: self.enable_ws,
        }
    }

    /// Decode the configured validator keys
    pub fn validator_keypairs(&self) -> Result<Vec<KeyPair>> {
        self.validator_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let secret = SecretKey::from_hex(key)
                    .with_context(|| format!("validator key {} is not a valid secret key", i))?;
                Ok(KeyPair::from_secret(secret))
            })
            .collect()
    }
}

/// Sample devnet configuration with freshly generated validator keys
pub fn generate_sample_config(validators: usize) -> NodeConfig {
    NodeConfig {
        validator_keys: (0..validators)
            .map(|_| KeyPair::generate().secret.to_hex())
            .collect(),
        ..NodeConfig::default()
    }
}
