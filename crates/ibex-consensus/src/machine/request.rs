use std::cmp::{Ordering, Reverse};

use ibex_core::{Block, Preprepare};
use tracing::{debug, trace, warn};

use super::Core;
use crate::error::ConsensusError;
use crate::messages::Payload;
use crate::state::State;

/// A request waiting for its sequence, ordered by block number
#[derive(Debug)]
pub(crate) struct PendingRequest(pub Block);

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.0.number() == other.0.number()
    }
}

impl Eq for PendingRequest {}

impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.number().cmp(&other.0.number())
    }
}

impl Core {
    pub(super) fn handle_request(&mut self, block: Block) -> Result<(), ConsensusError> {
        let sequence = self.current.sequence();

        match block.number().cmp(&sequence) {
            Ordering::Less => {
                warn!(number = block.number(), sequence, "Request for an old sequence");
                Err(ConsensusError::OldMessage)
            }
            Ordering::Greater => {
                trace!(number = block.number(), sequence, "Store future request");
                self.pending_requests.push(Reverse(PendingRequest(block)));
                Ok(())
            }
            Ordering::Equal => {
                debug!(number = block.number(), hash = %block.hash().short(), "Handle request");
                self.current.pending_request = Some(block.clone());

                // A locked proposer re-proposes its locked block instead
                if self.state == State::AcceptRequest
                    && !self.waiting_for_round_change
                    && !self.current.is_locked()
                {
                    self.send_preprepare(block);
                }
                Ok(())
            }
        }
    }

    /// Replay stored requests up to the current sequence
    pub(super) fn process_pending_requests(&mut self) {
        let sequence = self.current.sequence();

        while let Some(Reverse(PendingRequest(block))) = self.pending_requests.pop() {
            match block.number().cmp(&sequence) {
                Ordering::Less => {
                    trace!(number = block.number(), "Drop old request");
                }
                Ordering::Equal => {
                    if let Err(e) = self.handle_request(block) {
                        debug!("Failed to replay request: {}", e);
                    }
                }
                Ordering::Greater => {
                    self.pending_requests.push(Reverse(PendingRequest(block)));
                    break;
                }
            }
        }
    }

    pub(super) fn send_preprepare(&mut self, proposal: Block) {
        let view = self.current.view();
        if view.sequence != proposal.number() || !self.is_proposer() {
            return;
        }

        debug!(%view, hash = %proposal.hash().short(), "Send preprepare");
        self.broadcast(Payload::Preprepare(Preprepare::new(view, proposal)));
    }
}
