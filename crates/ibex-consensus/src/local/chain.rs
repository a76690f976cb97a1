use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use ibex_core::{Address, Block};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::Chain;
use crate::engine::EventSender;
use crate::error::ConsensusError;
use crate::events::Event;
use crate::messages::{Message, MessageCode, Payload};
use crate::validator::{Validator, ValidatorSet};

/// Append-only chain kept in memory, with a fixed validator set.
///
/// Every commit is checked against its seals and then reported back to the
/// engine as `FinalCommitted`.
pub struct MemoryChain {
    blocks: Mutex<Vec<Block>>,
    validators: Vec<Validator>,
    events: EventSender,
    head: watch::Sender<Block>,
    reject_commits: AtomicUsize,
}

impl MemoryChain {
    pub fn new(genesis: Block, validators: Vec<Validator>, events: EventSender) -> Self {
        let (head, _) = watch::channel(genesis.clone());
        MemoryChain {
            blocks: Mutex::new(vec![genesis]),
            validators,
            events,
            head,
            reject_commits: AtomicUsize::new(0),
        }
    }

    fn blocks(&self) -> Result<MutexGuard<'_, Vec<Block>>, ConsensusError> {
        self.blocks
            .lock()
            .map_err(|_| ConsensusError::Commit("chain lock poisoned".to_string()))
    }

    pub fn head(&self) -> Block {
        self.head.borrow().clone()
    }

    pub fn height(&self) -> u64 {
        self.head.borrow().number()
    }

    pub fn block(&self, number: u64) -> Option<Block> {
        self.blocks().ok()?.get(number as usize).cloned()
    }

    /// Watch the chain head
    pub fn subscribe_head(&self) -> watch::Receiver<Block> {
        self.head.subscribe()
    }

    /// Make the next `count` commits fail
    pub fn reject_next_commits(&self, count: usize) {
        self.reject_commits.store(count, Ordering::SeqCst);
    }

    /// Commit messages must be valid signed votes for `block` from more than
    /// 2f distinct validators
    fn verify_seals(&self, block: &Block, seals: &[Message]) -> Result<(), ConsensusError> {
        let set = ValidatorSet::new(self.validators.clone(), Default::default());
        let hash = block.hash();
        let mut signers = HashSet::new();

        for seal in seals {
            let Some((_, validator)) = set.get_by_address(&seal.address) else {
                continue;
            };
            let data = seal.payload_for_signing()?;
            if ibex_core::verify(&validator.public_key, &data, &seal.signature).is_err() {
                continue;
            }
            if let Ok(Payload::Commit(subject)) = seal.decode_payload() {
                if seal.code == MessageCode::Commit
                    && subject.view.sequence == block.number()
                    && subject.digest == hash
                {
                    signers.insert(seal.address);
                }
            }
        }

        if signers.len() > 2 * set.f() {
            Ok(())
        } else {
            Err(ConsensusError::Commit(format!(
                "{} valid seals, need {}",
                signers.len(),
                2 * set.f() + 1
            )))
        }
    }
}

impl Chain for MemoryChain {
    fn last_proposal(&self) -> (Block, Address) {
        let head = self.head();
        let proposer = head.header.proposer;
        (head, proposer)
    }

    fn validators(&self, _proposal: &Block) -> Vec<Validator> {
        self.validators.clone()
    }

    fn verify(&self, proposal: &Block) -> Result<(), ConsensusError> {
        let head = self.head();
        if proposal.number() != head.number() + 1 {
            return Err(ConsensusError::InvalidProposal(format!(
                "number {} does not follow head {}",
                proposal.number(),
                head.number()
            )));
        }
        if proposal.parent_hash() != head.hash() {
            return Err(ConsensusError::InvalidProposal("unknown parent".to_string()));
        }
        if !proposal.verify_payload() {
            return Err(ConsensusError::InvalidProposal("payload hash mismatch".to_string()));
        }
        Ok(())
    }

    fn commit(&self, proposal: &Block, seals: &[Message]) -> Result<(), ConsensusError> {
        let rejected = self
            .reject_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            warn!(number = proposal.number(), "Rejecting commit");
            return Err(ConsensusError::Commit("rejected by chain".to_string()));
        }

        self.verify(proposal)?;
        self.verify_seals(proposal, seals)?;

        self.blocks()?.push(proposal.clone());
        self.head.send_replace(proposal.clone());
        info!(number = proposal.number(), hash = %proposal.hash().short(), "Block appended");

        self.events
            .send(Event::FinalCommitted(proposal.clone()))
            .map_err(|_| ConsensusError::EngineStopped)
    }
}
