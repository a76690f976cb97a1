use std::collections::BTreeMap;

use ibex_core::View;

use crate::error::ConsensusError;
use crate::message_set::MessageSet;
use crate::messages::Message;
use crate::validator::ValidatorSet;

/// RoundChange votes bucketed by the exact view they ask for.
///
/// A validator counts once per sequence, for the highest round it asked
/// for, so one sender can never hold more than one bucket open.
#[derive(Debug, Default)]
pub struct RoundChangeSet {
    votes: BTreeMap<View, MessageSet>,
}

impl RoundChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vote for `view` and return how many distinct validators have
    /// voted for it.
    ///
    /// The sender's votes for lower rounds of the same sequence are dropped;
    /// a vote below one it already cast is `OldMessage`.
    pub fn add(
        &mut self,
        view: View,
        message: Message,
        validators: &ValidatorSet,
    ) -> Result<usize, ConsensusError> {
        let sender = message.address;
        let superseded = self
            .votes
            .range(view..)
            .take_while(|(v, _)| v.sequence == view.sequence)
            .any(|(v, set)| v.round > view.round && set.contains(&sender));
        if superseded {
            return Err(ConsensusError::OldMessage);
        }

        let set = self.votes.entry(view).or_insert_with(|| MessageSet::new(view));
        set.add(message, validators)?;
        let size = set.size();

        for (_, set) in self.votes.range_mut(View::new(view.sequence, 0)..view) {
            set.remove(&sender);
        }
        self.votes.retain(|_, set| !set.is_empty());

        Ok(size)
    }

    /// Drop every bucket for a view behind `view`
    pub fn clear(&mut self, view: &View) {
        self.votes.retain(|v, _| v >= view);
    }

    pub fn count(&self, view: &View) -> usize {
        self.votes.get(view).map(MessageSet::size).unwrap_or(0)
    }

    /// Highest round with at least `threshold` votes at `sequence`
    pub fn max_round(&self, sequence: u64, threshold: usize) -> Option<u64> {
        self.votes
            .iter()
            .rev()
            .find(|(view, set)| view.sequence == sequence && set.size() >= threshold)
            .map(|(view, _)| view.round)
    }

    /// Vote count per view, for the status dump
    pub fn summary(&self) -> BTreeMap<View, usize> {
        self.votes.iter().map(|(view, set)| (*view, set.size())).collect()
    }
}
