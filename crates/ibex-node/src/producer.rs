use std::sync::Arc;

use ibex_consensus::{now_millis, ConsensusError, EngineHandle, MemoryChain};
use ibex_core::{Address, Block};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Keeps asking one validator's engine to seal a block on top of its chain.
///
/// Every validator offers a block for each height; only the proposer's is
/// put to a vote, the others wait as pending requests until the head moves.
pub struct BlockProducer {
    address: Address,
    handle: EngineHandle,
    chain: Arc<MemoryChain>,
    block_period_ms: u64,
}

impl BlockProducer {
    pub fn new(
        address: Address,
        handle: EngineHandle,
        chain: Arc<MemoryChain>,
        block_period_ms: u64,
    ) -> Self {
        BlockProducer {
            address,
            handle,
            chain,
            block_period_ms,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Next block on top of `parent`, stamped no earlier than one block
    /// period after it
    pub fn build(&self, parent: &Block) -> Block {
        let number = parent.number() + 1;
        let timestamp = now_millis().max(parent.header.timestamp + self.block_period_ms);
        let payload = format!("height {} from {}", number, self.address).into_bytes();
        Block::new(number, parent.hash(), timestamp, self.address, payload)
    }

    async fn run(self) {
        info!(address = %self.address, "Block producer started");

        loop {
            let parent = self.chain.head();
            let block = self.build(&parent);
            let number = block.number();

            let mut head = self.chain.subscribe_head();
            let moved_on = async move {
                let _ = head.wait_for(|b| b.number() >= number).await;
            };

            match self.handle.seal(block, moved_on).await {
                Ok(block) => {
                    info!(number, hash = %block.hash().short(), "Sealed block");
                }
                Err(ConsensusError::Stopped) | Err(ConsensusError::Superseded(_)) => {
                    debug!(number, "Another validator's block was committed");
                }
                Err(ConsensusError::EngineStopped) => break,
                Err(e) => {
                    warn!(number, "Sealing failed: {}", e);
                }
            }
        }

        info!(address = %self.address, "Block producer stopped");
    }
}
