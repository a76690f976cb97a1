#![allow(dead_code)]

use std::time::Duration;

use ibex_consensus::{CoreStatus, EngineHandle, LocalCluster, LocalNode};
use ibex_core::{Block, KeyPair};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(30);

pub fn validator_keys(n: usize) -> Vec<KeyPair> {
    (0..n).map(|_| KeyPair::generate()).collect()
}

/// Block on top of `node`'s chain head, proposed by `node`
pub fn next_block(node: &LocalNode, payload: &[u8]) -> Block {
    let head = node.chain.head();
    Block::new(head.number() + 1, head.hash(), 0, node.keys.address, payload.to_vec())
}

pub async fn wait_for_status<F>(handle: &EngineHandle, predicate: F) -> CoreStatus
where
    F: Fn(&CoreStatus) -> bool,
{
    let mut status = handle.subscribe_status();
    timeout(WAIT, async {
        loop {
            let current = status.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            status.changed().await.expect("engine stopped");
        }
    })
    .await
    .expect("timed out waiting for engine status")
}

pub async fn wait_for_height(nodes: &[LocalNode], height: u64) {
    for node in nodes {
        let mut head = node.chain.subscribe_head();
        timeout(WAIT, head.wait_for(|b| b.number() >= height))
            .await
            .expect("timed out waiting for block")
            .expect("chain dropped");
    }
}

pub fn nodes(cluster: &LocalCluster) -> &[LocalNode] {
    &cluster.nodes
}
