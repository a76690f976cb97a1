use ibex_core::{Address, PublicKey};
use serde::{Deserialize, Serialize};

use crate::config::ProposerPolicy;

/// A consensus participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub public_key: PublicKey,
}

impl Validator {
    pub fn new(public_key: PublicKey) -> Self {
        Validator {
            address: public_key.address(),
            public_key,
        }
    }
}

/// Validators for one sequence, sorted by address, plus the proposer
/// picked for the current round.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    policy: ProposerPolicy,
    proposer: Option<Validator>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<Validator>, policy: ProposerPolicy) -> Self {
        validators.sort_by_key(|v| v.address);
        validators.dedup_by_key(|v| v.address);
        let proposer = validators.first().copied();

        ValidatorSet {
            validators,
            policy,
            proposer,
        }
    }

    pub fn from_public_keys(keys: &[PublicKey], policy: ProposerPolicy) -> Self {
        Self::new(keys.iter().copied().map(Validator::new).collect(), policy)
    }

    pub fn size(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators in address order
    pub fn list(&self) -> &[Validator] {
        &self.validators
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    pub fn get_by_address(&self, address: &Address) -> Option<(usize, &Validator)> {
        self.validators
            .binary_search_by_key(address, |v| v.address)
            .ok()
            .map(|index| (index, &self.validators[index]))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get_by_address(address).is_some()
    }

    pub fn get_proposer(&self) -> Option<&Validator> {
        self.proposer.as_ref()
    }

    pub fn is_proposer(&self, address: &Address) -> bool {
        self.proposer.is_some_and(|p| p.address == *address)
    }

    /// Recompute the proposer from the previous block's proposer and the round.
    ///
    /// Every honest replica feeds the same inputs and lands on the same
    /// validator. A zero `last_proposer` (genesis) seeds with the round alone.
    pub fn calc_proposer(&mut self, last_proposer: &Address, round: u64) {
        if self.validators.is_empty() {
            self.proposer = None;
            return;
        }

        let seed = if last_proposer.is_zero() {
            round
        } else {
            let offset = self
                .get_by_address(last_proposer)
                .map(|(index, _)| index as u64)
                .unwrap_or(0);
            match self.policy {
                ProposerPolicy::RoundRobin => offset + round + 1,
                ProposerPolicy::Sticky => offset + round,
            }
        };

        let pick = (seed % self.validators.len() as u64) as usize;
        self.proposer = self.validators.get(pick).copied();
    }

    /// Maximum number of faulty validators tolerated: ceil(N/3) - 1
    pub fn f(&self) -> usize {
        self.validators.len().div_ceil(3).saturating_sub(1)
    }
}
