use ibex_core::{Block, Subject};
use tracing::{debug, error, info};

use super::Core;
use crate::backlog::check_message;
use crate::checkpoint::CheckpointTarget;
use crate::error::ConsensusError;
use crate::events::InternalEvent;
use crate::messages::{Message, MessageCode, Payload};

impl Core {
    /// The chain finalized `block`; archive the snapshot it came from and
    /// move on to the next sequence
    pub(super) fn handle_final_committed(&mut self, block: Block) -> Result<(), ConsensusError> {
        let sequence = self.current.sequence();
        if block.number() < sequence {
            debug!(number = block.number(), sequence, "Already past final committed block");
        } else {
            self.start_new_round(0);
        }

        let hash = block.hash();
        let Some(snapshot) = self
            .finalizing
            .take()
            .filter(|s| s.proposal().map(Block::hash) == Some(hash))
        else {
            return Ok(());
        };

        let subject = snapshot.subject();
        self.checkpoints.archive(snapshot);
        self.broadcast(Payload::Checkpoint(subject));

        if self.checkpoints.is_due(subject.view.sequence)
            && self.internal.send(InternalEvent::BuildCheckpoint).is_err()
        {
            error!("Engine inbox closed, skipping stable checkpoint");
        }
        Ok(())
    }

    pub(super) fn handle_checkpoint(&mut self, message: &Message, subject: &Subject) -> Result<(), ConsensusError> {
        let finalizing = self
            .finalizing
            .as_ref()
            .is_some_and(|s| s.view() == subject.view);

        let snapshot = if finalizing {
            self.finalizing.as_mut().ok_or(ConsensusError::InvalidMessage)?
        } else {
            check_message(MessageCode::Checkpoint, &subject.view, &self.position())?;

            let target = self
                .checkpoints
                .locate(self.current.sequence(), subject.view.sequence)?;
            match target {
                CheckpointTarget::Current => &mut self.current,
                CheckpointTarget::Archived(index) => self
                    .checkpoints
                    .archived_mut(index)
                    .ok_or(ConsensusError::InvalidMessage)?,
            }
        };

        if !subject.matches(&snapshot.subject()) {
            return Err(ConsensusError::SubjectNotMatched);
        }
        snapshot.checkpoints.add(message.clone(), &self.validators)?;

        debug!(
            from = %message.address,
            view = %subject.view,
            votes = snapshot.checkpoints.size(),
            "Accept checkpoint"
        );
        Ok(())
    }

    pub(super) fn build_stable_checkpoint(&mut self) {
        match self
            .checkpoints
            .build_stable(self.validators.f(), self.backend.store.as_ref())
        {
            Ok(Some(view)) => info!(remaining = self.checkpoints.len(), "Built stable checkpoint {}", view),
            Ok(None) => debug!(archived = self.checkpoints.len(), "No snapshot has a checkpoint quorum yet"),
            Err(e) => error!("Failed to persist stable checkpoint: {}", e),
        }
    }
}
