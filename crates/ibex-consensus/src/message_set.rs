use std::collections::BTreeMap;

use ibex_core::{Address, View};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConsensusError;
use crate::messages::Message;
use crate::validator::ValidatorSet;

/// Votes of one kind for one view, at most one per validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSet {
    view: View,
    messages: BTreeMap<Address, Message>,
}

impl MessageSet {
    pub fn new(view: View) -> Self {
        MessageSet {
            view,
            messages: BTreeMap::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Record a vote. The sender must belong to `validators`; a second vote
    /// from the same sender replaces the first and does not change `size`.
    pub fn add(&mut self, message: Message, validators: &ValidatorSet) -> Result<(), ConsensusError> {
        if !validators.contains(&message.address) {
            return Err(ConsensusError::NoMatchingValidator(message.address));
        }

        if self.messages.insert(message.address, message).is_some() {
            trace!(view = %self.view, "Replaced duplicate vote");
        }

        Ok(())
    }

    /// Number of distinct voters
    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn get(&self, address: &Address) -> Option<&Message> {
        self.messages.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.messages.contains_key(address)
    }

    pub fn remove(&mut self, address: &Address) -> Option<Message> {
        self.messages.remove(address)
    }
}
