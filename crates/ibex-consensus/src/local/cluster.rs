use std::sync::Arc;

use ibex_core::{Block, KeyPair};
use ibex_storage::MemoryStorage;
use tokio::task::JoinHandle;
use tracing::info;

use super::{LocalNetwork, MemoryChain};
use crate::backend::{Backend, StorageStore, Store};
use crate::config::Config;
use crate::engine::{inbox, Engine, EngineHandle};
use crate::validator::Validator;

/// One validator of a [`LocalCluster`]
pub struct LocalNode {
    pub keys: KeyPair,
    pub handle: EngineHandle,
    pub chain: Arc<MemoryChain>,
    pub task: JoinHandle<()>,
}

/// Engines for a set of validators, connected over a [`LocalNetwork`]
pub struct LocalCluster {
    pub network: LocalNetwork,
    pub nodes: Vec<LocalNode>,
}

impl LocalCluster {
    /// Start one engine per key. Nodes are ordered by address, so node `i`
    /// is validator `i` of the set.
    pub fn start<F>(mut keys: Vec<KeyPair>, config: Config, genesis: Block, mut store: F) -> Self
    where
        F: FnMut(&KeyPair) -> Arc<dyn Store>,
    {
        keys.sort_by_key(|k| k.address);
        keys.dedup_by_key(|k| k.address);
        let members = keys
            .into_iter()
            .map(|k| {
                let store = store(&k);
                (k, store)
            })
            .collect();
        Self::with_stores(members, config, genesis)
    }

    /// Start one engine per validator, each persisting to its own store
    pub fn with_stores(
        mut members: Vec<(KeyPair, Arc<dyn Store>)>,
        config: Config,
        genesis: Block,
    ) -> Self {
        members.sort_by_key(|(k, _)| k.address);
        members.dedup_by_key(|(k, _)| k.address);

        let validators: Vec<Validator> = members.iter().map(|(k, _)| Validator::new(k.public)).collect();
        let network = LocalNetwork::new();

        let nodes = members
            .into_iter()
            .map(|(keys, store)| {
                let (tx, rx) = inbox();
                network.register(keys.address, tx.clone());
                (keys, store, tx, rx)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(keys, store, tx, rx)| {
                let chain = Arc::new(MemoryChain::new(genesis.clone(), validators.clone(), tx.clone()));
                let backend = Backend::new(
                    keys.clone(),
                    Arc::new(network.endpoint(keys.address)),
                    store,
                    chain.clone(),
                );
                let (handle, task) = Engine::spawn(config.clone(), backend, (tx, rx));
                LocalNode {
                    keys,
                    handle,
                    chain,
                    task,
                }
            })
            .collect::<Vec<_>>();

        info!(validators = nodes.len(), "Local cluster started");
        LocalCluster { network, nodes }
    }

    /// Cluster whose engines persist to memory
    pub fn with_memory_stores(keys: Vec<KeyPair>, config: Config, genesis: Block) -> Self {
        Self::start(keys, config, genesis, |_| -> Arc<dyn Store> {
            Arc::new(StorageStore::new(MemoryStorage::new()))
        })
    }

    pub fn node(&self, index: usize) -> Option<&LocalNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stop every engine and wait for their tasks
    pub async fn shutdown(self) {
        for node in &self.nodes {
            let _ = node.handle.shutdown();
        }
        for node in self.nodes {
            let _ = node.task.await;
        }
    }
}
