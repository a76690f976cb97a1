use ibex_core::Subject;
use tracing::{debug, error, info};

use super::Core;
use crate::backlog::check_message;
use crate::error::ConsensusError;
use crate::messages::{Message, MessageCode, Payload};
use crate::state::State;

impl Core {
    pub(super) fn send_commit(&mut self) {
        let subject = self.current.subject();
        self.broadcast(Payload::Commit(subject));
    }

    pub(super) fn handle_commit(&mut self, message: &Message, subject: &Subject) -> Result<(), ConsensusError> {
        check_message(MessageCode::Commit, &subject.view, &self.position())?;
        self.verify_subject(message, subject)?;

        self.current.commits.add(message.clone(), &self.validators)?;
        let votes = self.current.commits.size();
        debug!(from = %message.address, view = %subject.view, votes, "Accept commit");

        if votes > 2 * self.validators.f() && self.state < State::Committed {
            self.current.lock_hash();
            self.commit();
        }

        Ok(())
    }

    /// Hand the proposal to the chain. A rejected proposal is discarded and
    /// the replica moves to the next round.
    fn commit(&mut self) {
        self.set_state(State::Committed);

        let Some(proposal) = self.current.proposal().cloned() else {
            return;
        };
        let seals: Vec<Message> = self.current.commits.values().cloned().collect();

        match self.backend.chain.commit(&proposal, &seals) {
            Ok(()) => {
                info!(
                    number = proposal.number(),
                    round = self.current.round(),
                    seals = seals.len(),
                    "Committed block {}",
                    proposal.hash()
                );
                // No subscribers is fine
                let _ = self.committed.send(proposal);
            }
            Err(e) => {
                error!(number = proposal.number(), "Failed to commit proposal: {}", e);
                self.current.unlock_hash();
                self.send_next_round_change();
            }
        }
    }
}
