use std::sync::Arc;

use anyhow::{bail, Result};
use ibex_consensus::{LocalCluster, StorageStore, Store};
use ibex_core::{Block, KeyPair};
use ibex_rpc::RpcServer;
use ibex_storage::FileStorage;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::producer::BlockProducer;

const CONSENSUS_FILE: &str = "consensus.bin";

/// An Ibex devnet: every configured validator in one process
pub struct Node {
    config: NodeConfig,
    keys: Vec<KeyPair>,
}

impl Node {
    /// Create a new node from configuration
    pub fn new(config: NodeConfig) -> Result<Self> {
        let keys = config.validator_keypairs()?;
        if keys.is_empty() {
            bail!("No validator keys configured. Run 'ibex init' to generate some.");
        }
        Ok(Node { config, keys })
    }

    /// Open the file-backed store of every validator
    fn open_stores(&self) -> Result<Vec<(KeyPair, Arc<dyn Store>)>> {
        self.keys
            .iter()
            .map(|keys| {
                let path = self
                    .config
                    .data_dir
                    .join(keys.address.to_hex())
                    .join(CONSENSUS_FILE);
                let store: Arc<dyn Store> = Arc::new(StorageStore::new(FileStorage::open(path)?));
                Ok((keys.clone(), store))
            })
            .collect()
    }

    /// Start the engines and one block producer per validator
    pub fn start(&self) -> Result<(LocalCluster, Vec<JoinHandle<()>>)> {
        let genesis = Block::genesis(self.config.genesis_timestamp);
        let cluster = LocalCluster::with_stores(self.open_stores()?, self.config.consensus.clone(), genesis);

        let producers = cluster
            .nodes
            .iter()
            .map(|node| {
                BlockProducer::new(
                    node.keys.address,
                    node.handle.clone(),
                    node.chain.clone(),
                    self.config.consensus.block_period_ms,
                )
                .spawn()
            })
            .collect();

        Ok((cluster, producers))
    }

    /// Run the devnet until ctrl-c
    pub async fn run(self) -> Result<()> {
        info!(
            validators = self.keys.len(),
            data_dir = %self.config.data_dir.display(),
            "Starting Ibex devnet"
        );

        let (cluster, producers) = self.start()?;
        for (i, node) in cluster.nodes.iter().enumerate() {
            info!("Validator {}: {}", i, node.keys.address);
        }

        let rpc_server = RpcServer::new(
            self.config.rpc_config(),
            cluster.nodes.iter().map(|n| n.handle.clone()).collect(),
        );

        tokio::select! {
            result = rpc_server.run() => {
                if let Err(e) = result {
                    error!("RPC server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
            }
        }

        cluster.shutdown().await;
        for producer in producers {
            producer.await?;
        }

        Ok(())
    }
}
