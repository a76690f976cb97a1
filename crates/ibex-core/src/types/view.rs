use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Hash;
use crate::types::block::Block;

/// A consensus instance: the block number being agreed on and the attempt
/// within it. Field order makes the derived ordering lexicographic by
/// (sequence, round).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct View {
    pub sequence: u64,
    pub round: u64,
}

impl View {
    pub fn new(sequence: u64, round: u64) -> Self {
        View { sequence, round }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{seq: {}, round: {}}}", self.sequence, self.round)
    }
}

/// What Prepare, Commit, Checkpoint and RoundChange votes refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub view: View,
    pub digest: Hash,
}

impl Subject {
    /// Field-by-field match on view and digest
    pub fn matches(&self, other: &Subject) -> bool {
        self.view.sequence == other.view.sequence
            && self.view.round == other.view.round
            && self.digest == other.digest
    }
}

/// The proposer's proposal for a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprepare {
    pub view: View,
    pub proposal: Option<Block>,
}

impl Preprepare {
    pub fn new(view: View, proposal: Block) -> Self {
        Preprepare {
            view,
            proposal: Some(proposal),
        }
    }

    /// Subject other votes for this preprepare must carry
    pub fn subject(&self) -> Option<Subject> {
        self.proposal.as_ref().map(|p| Subject {
            view: self.view,
            digest: p.hash(),
        })
    }
}
