use ibex_core::Subject;
use tracing::debug;

use super::Core;
use crate::backlog::check_message;
use crate::error::ConsensusError;
use crate::messages::{Message, MessageCode};

impl Core {
    pub(super) fn handle_round_change(
        &mut self,
        message: &Message,
        subject: &Subject,
    ) -> Result<(), ConsensusError> {
        check_message(MessageCode::RoundChange, &subject.view, &self.position())?;

        let current = self.current.view();
        if subject.view.sequence != current.sequence {
            return Err(ConsensusError::InvalidRoundChange {
                current: current.sequence,
                got: subject.view.sequence,
            });
        }
        if subject.view.round < current.round {
            return Err(ConsensusError::OldMessage);
        }

        let votes = self
            .round_change_set
            .add(subject.view, message.clone(), &self.validators)?;
        debug!(from = %message.address, view = %subject.view, votes, "Accept round change");

        let f = self.validators.f();
        let target = subject.view.round;

        // Weak certificate: enough honest replicas are ahead of us
        if votes == f + 1 && self.current.round() < target {
            self.send_round_change(target);
        }

        // Strong certificate. The weak step above may already have moved us
        // to `target`, which only matters when f + 1 == 2f + 1.
        if votes == 2 * f + 1 && (self.waiting_for_round_change || self.current.round() < target) {
            self.start_new_round(target);
        }

        Ok(())
    }
}
