//! Liveness: replicas leave a round whose proposer does not deliver

mod common;

use std::future::pending;

use ibex_consensus::{Config, ConsensusError, LocalCluster, State};
use ibex_core::Block;

use common::{next_block, validator_keys, wait_for_height, wait_for_status, WAIT};

fn fast_timeout() -> Config {
    Config {
        request_timeout_ms: 1_000,
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_proposer_is_replaced() {
    let cluster = LocalCluster::with_memory_stores(validator_keys(4), fast_timeout(), Block::genesis(0));
    let silent = cluster.nodes[0].keys.address;
    cluster.network.set_offline(silent, true);

    let next_proposer = cluster.nodes[1].keys.address.to_hex();
    for node in &cluster.nodes[1..] {
        let status = wait_for_status(&node.handle, |s| s.round == 1 && !s.waiting_for_round_change).await;
        assert_eq!(status.sequence, 1);
        assert_eq!(status.state, Some(State::AcceptRequest));
        assert_eq!(status.proposer.as_deref(), Some(next_proposer.as_str()));
    }

    // The three live validators still form a quorum under the new proposer
    let proposer = &cluster.nodes[1];
    let block = next_block(proposer, b"after round change");
    let sealed = tokio::time::timeout(WAIT, proposer.handle.seal(block.clone(), pending()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sealed.hash(), block.hash());

    wait_for_height(&cluster.nodes[1..], 1).await;
    assert_eq!(cluster.nodes[0].chain.height(), 0);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_commit_restarts_round() {
    let cluster = LocalCluster::with_memory_stores(validator_keys(4), fast_timeout(), Block::genesis(0));
    for node in &cluster.nodes {
        node.chain.reject_next_commits(1);
    }

    let first = next_block(&cluster.nodes[0], b"rejected");
    let first_seal = cluster.nodes[0].handle.seal(first.clone(), pending());

    let retry = async {
        for node in &cluster.nodes {
            wait_for_status(&node.handle, |s| s.round == 1 && !s.waiting_for_round_change).await;
        }
        let proposer = &cluster.nodes[1];
        let block = next_block(proposer, b"accepted");
        proposer.handle.seal(block, pending()).await
    };

    let (first_result, retry_result) = tokio::join!(first_seal, retry);
    let accepted = retry_result.unwrap();
    assert!(matches!(first_result, Err(ConsensusError::Superseded(1))));

    wait_for_height(&cluster.nodes, 1).await;
    for node in &cluster.nodes {
        assert_eq!(node.chain.block(1).unwrap().hash(), accepted.hash());
        assert_ne!(accepted.hash(), first.hash());
    }

    cluster.shutdown().await;
}
