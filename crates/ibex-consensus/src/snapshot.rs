use ibex_core::{Block, Hash, Preprepare, Subject, View};
use serde::{Deserialize, Serialize};

use crate::message_set::MessageSet;

/// Everything one replica knows about a single view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    view: View,
    pub preprepare: Option<Preprepare>,
    pub prepares: MessageSet,
    pub commits: MessageSet,
    pub checkpoints: MessageSet,
    /// Proposal hash this replica is locked on across rounds
    locked_hash: Option<Hash>,
    /// Latest request for this sequence, proposed if we become proposer
    pub pending_request: Option<Block>,
}

impl Snapshot {
    pub fn new(view: View) -> Self {
        Snapshot {
            view,
            preprepare: None,
            prepares: MessageSet::new(view),
            commits: MessageSet::new(view),
            checkpoints: MessageSet::new(view),
            locked_hash: None,
            pending_request: None,
        }
    }

    /// Fresh snapshot for `view` that keeps the locked preprepare and the
    /// pending request of `self`
    pub fn next_round(&self, view: View) -> Self {
        let mut next = Snapshot::new(view);
        next.pending_request = self.pending_request.clone();

        if let Some(locked) = self.locked_hash {
            next.preprepare = self
                .preprepare
                .as_ref()
                .filter(|p| p.proposal.as_ref().is_some_and(|b| b.hash() == locked))
                .map(|p| Preprepare {
                    view,
                    proposal: p.proposal.clone(),
                });
            if next.preprepare.is_some() {
                next.locked_hash = Some(locked);
            }
        }

        next
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn sequence(&self) -> u64 {
        self.view.sequence
    }

    pub fn round(&self) -> u64 {
        self.view.round
    }

    pub fn proposal(&self) -> Option<&Block> {
        self.preprepare.as_ref().and_then(|p| p.proposal.as_ref())
    }

    /// Subject for this view; the digest is zero until a proposal is accepted
    pub fn subject(&self) -> Subject {
        Subject {
            view: self.view,
            digest: self.proposal().map(Block::hash).unwrap_or(Hash::ZERO),
        }
    }

    pub fn set_preprepare(&mut self, preprepare: Preprepare) {
        self.preprepare = Some(preprepare);
    }

    pub fn lock_hash(&mut self) {
        if let Some(hash) = self.proposal().map(Block::hash) {
            self.locked_hash = Some(hash);
        }
    }

    pub fn unlock_hash(&mut self) {
        self.locked_hash = None;
    }

    pub fn locked_hash(&self) -> Option<Hash> {
        self.locked_hash
    }

    pub fn is_locked(&self) -> bool {
        self.locked_hash.is_some()
    }

    /// The proposal we are locked on, if any
    pub fn locked_proposal(&self) -> Option<&Block> {
        let locked = self.locked_hash?;
        self.proposal().filter(|b| b.hash() == locked)
    }
}
