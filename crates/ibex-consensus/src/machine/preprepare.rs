use ibex_core::Preprepare;
use tracing::{debug, warn};

use super::Core;
use crate::backlog::check_message;
use crate::error::ConsensusError;
use crate::messages::{Message, MessageCode};
use crate::state::State;

impl Core {
    pub(super) fn handle_preprepare(
        &mut self,
        message: &Message,
        preprepare: &Preprepare,
    ) -> Result<(), ConsensusError> {
        check_message(MessageCode::Preprepare, &preprepare.view, &self.position())?;

        if !self.validators.is_proposer(&message.address) {
            warn!(from = %message.address, view = %preprepare.view, "Ignore preprepare from non-proposer");
            return Err(ConsensusError::NotFromProposer);
        }

        let Some(proposal) = preprepare.proposal.as_ref() else {
            return Err(ConsensusError::NilProposal);
        };
        if proposal.number() != preprepare.view.sequence {
            return Err(ConsensusError::InvalidMessage);
        }

        // A resent preprepare after we moved past it
        if self.state != State::AcceptRequest {
            return Ok(());
        }

        if let Err(e) = self.backend.chain.verify(proposal) {
            warn!(view = %preprepare.view, "Proposal failed verification: {}", e);
            self.send_next_round_change();
            return Err(e);
        }

        let hash = proposal.hash();
        match self.current.locked_hash() {
            Some(locked) if locked == hash => {
                // Already prepared this proposal in an earlier round
                debug!(view = %preprepare.view, hash = %hash.short(), "Accept locked proposal");
                self.current.set_preprepare(preprepare.clone());
                self.set_state(State::Prepared);
                self.send_commit();
            }
            Some(locked) => {
                warn!(
                    view = %preprepare.view,
                    locked = %locked.short(),
                    hash = %hash.short(),
                    "Proposal does not match locked hash"
                );
                self.send_next_round_change();
            }
            None => {
                debug!(view = %preprepare.view, hash = %hash.short(), "Accept preprepare");
                self.current.set_preprepare(preprepare.clone());
                self.set_state(State::Preprepared);
                self.send_prepare();
            }
        }

        Ok(())
    }
}
