//! The consensus state machine.
//!
//! [`Core`] owns every piece of per-validator consensus state and is only
//! ever touched from the engine task, so none of it is behind a lock.

mod checkpoint;
mod commit;
mod handler;
mod prepare;
mod preprepare;
mod request;
mod round_change;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ibex_core::{Address, Block, Hash, Subject, View};
use tokio::sync::{broadcast, mpsc::UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::backlog::{Backlog, Position};
use crate::checkpoint::CheckpointManager;
use crate::config::Config;
use crate::error::ConsensusError;
use crate::events::InternalEvent;
use crate::messages::{Message, Payload};
use crate::round_change_set::RoundChangeSet;
use crate::snapshot::Snapshot;
use crate::state::State;
use crate::status::CoreStatus;
use crate::timer::RoundChangeTimer;
use crate::validator::ValidatorSet;

use request::PendingRequest;

pub(crate) struct Core {
    config: Config,
    address: Address,
    backend: Backend,

    state: State,
    current: Snapshot,
    /// Committed snapshot replaced before the chain confirmed it
    finalizing: Option<Snapshot>,
    validators: ValidatorSet,
    waiting_for_round_change: bool,

    backlog: Backlog,
    pending_requests: BinaryHeap<Reverse<PendingRequest>>,
    round_change_set: RoundChangeSet,
    checkpoints: CheckpointManager,

    timer: RoundChangeTimer,
    internal: UnboundedSender<InternalEvent>,
    committed: broadcast::Sender<Block>,
}

impl Core {
    pub fn new(
        config: Config,
        backend: Backend,
        internal: UnboundedSender<InternalEvent>,
        committed: broadcast::Sender<Block>,
    ) -> Self {
        let address = backend.address();
        let (last, last_proposer) = backend.chain.last_proposal();
        let view = View::new(last.number() + 1, 0);

        let mut validators =
            ValidatorSet::new(backend.chain.validators(&last), config.proposer_policy);
        validators.calc_proposer(&last_proposer, view.round);

        Core {
            address,
            state: State::AcceptRequest,
            current: Snapshot::new(view),
            finalizing: None,
            validators,
            waiting_for_round_change: false,
            backlog: Backlog::new(address),
            pending_requests: BinaryHeap::new(),
            round_change_set: RoundChangeSet::new(),
            checkpoints: CheckpointManager::new(config.checkpoint_period),
            timer: RoundChangeTimer::new(config.request_timeout()),
            internal,
            committed,
            backend,
            config,
        }
    }

    /// Restore the stable checkpoint and arm the timer for the first view
    pub fn start(&mut self) {
        if let Err(e) = self.checkpoints.restore(self.backend.store.as_ref()) {
            error!("Failed to restore stable checkpoint: {}", e);
        }

        let view = self.current.view();
        self.timer.reset(view, &self.internal);
        info!(
            address = %self.address,
            validators = self.validators.size(),
            "Consensus started at {}",
            view
        );
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    fn position(&self) -> Position {
        Position {
            view: self.current.view(),
            state: self.state,
            waiting_for_round_change: self.waiting_for_round_change,
        }
    }

    fn is_proposer(&self) -> bool {
        self.validators.is_proposer(&self.address)
    }

    /// Enter `round`: either the first round of the sequence after the chain
    /// head, or a higher round of the current sequence.
    fn start_new_round(&mut self, round: u64) {
        let (last, last_proposer) = self.backend.chain.last_proposal();
        let sequence = self.current.sequence();

        let round_change;
        let view;
        if last.number() >= sequence {
            view = View::new(last.number() + 1, 0);
            round_change = false;

            self.validators =
                ValidatorSet::new(self.backend.chain.validators(&last), self.config.proposer_policy);
            self.round_change_set = RoundChangeSet::new();
            self.replace_current(Snapshot::new(view));
        } else if last.number() + 1 == sequence {
            if round == 0 {
                // Same sequence, same round
                return;
            }
            if round < self.current.round() {
                warn!("New round {} should not be smaller than current round {}", round, self.current.round());
                return;
            }
            view = View::new(sequence, round);
            round_change = true;

            self.round_change_set.clear(&view);
            self.replace_current(self.current.next_round(view));
        } else {
            warn!("Chain head {} is behind current sequence {}", last.number(), sequence);
            return;
        }

        self.validators.calc_proposer(&last_proposer, view.round);
        self.waiting_for_round_change = false;
        self.set_state(State::AcceptRequest);

        if round_change && self.is_proposer() {
            let proposal = self
                .current
                .locked_proposal()
                .or(self.current.pending_request.as_ref())
                .cloned();
            if let Some(proposal) = proposal {
                self.send_preprepare(proposal);
            }
        }

        self.timer.reset(view, &self.internal);

        info!(
            proposer = ?self.validators.get_proposer().map(|v| v.address),
            is_proposer = self.is_proposer(),
            "New round {}",
            view
        );
    }

    /// Move to `view` and wait there for a round change certificate
    fn catch_up_round(&mut self, view: View) {
        info!("Catch up round {}", view);

        self.waiting_for_round_change = true;
        self.round_change_set.clear(&view);
        self.replace_current(self.current.next_round(view));
        self.timer.reset(view, &self.internal);
    }

    /// Make `next` the current snapshot. A snapshot whose proposal went to
    /// the chain stays aside until `FinalCommitted` archives it.
    fn replace_current(&mut self, next: Snapshot) {
        let previous = std::mem::replace(&mut self.current, next);
        if self.state == State::Committed && previous.is_locked() && self.finalizing.is_none() {
            self.finalizing = Some(previous);
        }
    }

    /// Catch up to `round` and ask everyone to move there
    fn send_round_change(&mut self, round: u64) {
        let current = self.current.view();
        if current.round >= round {
            warn!("Cannot send round change for round {} at {}", round, current);
            return;
        }

        let view = View::new(current.sequence, round);
        self.catch_up_round(view);
        self.broadcast(Payload::RoundChange(Subject {
            view,
            digest: Hash::ZERO,
        }));
    }

    fn send_next_round_change(&mut self) {
        self.send_round_change(self.current.round() + 1);
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!(view = %self.current.view(), "State {} -> {}", self.state, state);
            self.state = state;
        }
        if state == State::AcceptRequest {
            self.process_pending_requests();
        }
        self.process_backlog();
    }

    /// Sign `payload` into an envelope from this replica
    fn finalize_message(&self, payload: &Payload) -> Result<Message, ConsensusError> {
        let mut message = Message::new(payload.code(), payload.encode()?, self.address);
        let data = message.payload_for_signing()?;
        message.signature = self.backend.signer.sign(&data);
        Ok(message)
    }

    /// Send `payload` to every other validator and deliver it locally
    fn broadcast(&mut self, payload: Payload) {
        let message = match self.finalize_message(&payload) {
            Ok(message) => message,
            Err(e) => {
                error!(code = ?payload.code(), "Failed to finalize message: {}", e);
                return;
            }
        };

        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(code = ?payload.code(), "Failed to encode message: {}", e);
                return;
            }
        };

        let targets: Vec<Address> = self
            .validators
            .list()
            .iter()
            .map(|v| v.address)
            .filter(|address| *address != self.address)
            .collect();
        if let Err(e) = self.backend.transport.broadcast(&targets, bytes) {
            error!(code = ?payload.code(), "Failed to broadcast message: {}", e);
        }

        if self.internal.send(InternalEvent::Loopback(message)).is_err() {
            error!("Engine inbox closed");
        }
    }

    pub fn status(&self) -> CoreStatus {
        CoreStatus {
            address: self.address.to_hex(),
            sequence: self.current.sequence(),
            round: self.current.round(),
            state: Some(self.state),
            proposer: self.validators.get_proposer().map(|v| v.address.to_hex()),
            waiting_for_round_change: self.waiting_for_round_change,
            locked_hash: self.current.locked_hash().map(|h| h.to_hex()),
            prepares: self.current.prepares.size(),
            commits: self.current.commits.size(),
            round_change_votes: self
                .round_change_set
                .summary()
                .into_iter()
                .map(|(view, count)| (format!("{}/{}", view.sequence, view.round), count))
                .collect(),
            backlog: self
                .backlog
                .sizes()
                .into_iter()
                .map(|(address, size)| (address.to_hex(), size))
                .collect(),
            pending_requests: self.pending_requests.len(),
            archived_snapshots: self.checkpoints.len(),
            stable_checkpoint: self.checkpoints.stable().map(|s| s.view()),
            validators: self.validators.size(),
        }
    }
}

#[cfg(test)]
mod tests;
