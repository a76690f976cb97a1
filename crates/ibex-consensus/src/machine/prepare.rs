use ibex_core::Subject;
use tracing::{debug, warn};

use super::Core;
use crate::backlog::check_message;
use crate::error::ConsensusError;
use crate::messages::{Message, MessageCode, Payload};
use crate::state::State;

impl Core {
    pub(super) fn send_prepare(&mut self) {
        let subject = self.current.subject();
        self.broadcast(Payload::Prepare(subject));
    }

    pub(super) fn handle_prepare(&mut self, message: &Message, subject: &Subject) -> Result<(), ConsensusError> {
        check_message(MessageCode::Prepare, &subject.view, &self.position())?;
        self.verify_subject(message, subject)?;

        self.current.prepares.add(message.clone(), &self.validators)?;
        let votes = self.current.prepares.size();
        debug!(from = %message.address, view = %subject.view, votes, "Accept prepare");

        if votes > 2 * self.validators.f() && self.state < State::Prepared {
            self.current.lock_hash();
            self.set_state(State::Prepared);
            self.send_commit();
        }

        Ok(())
    }

    /// A vote must refer to exactly the view and proposal we hold
    pub(super) fn verify_subject(&self, message: &Message, subject: &Subject) -> Result<(), ConsensusError> {
        let expected = self.current.subject();
        if !subject.matches(&expected) {
            warn!(
                from = %message.address,
                code = ?message.code,
                expected = %expected.view,
                got = %subject.view,
                "Inconsistent subject"
            );
            return Err(ConsensusError::SubjectNotMatched);
        }
        Ok(())
    }
}
