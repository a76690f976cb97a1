use ibex_core::View;
use tracing::{debug, trace, warn};

use super::Core;
use crate::backlog::check_message;
use crate::error::ConsensusError;
use crate::events::{Event, InternalEvent};
use crate::messages::{Message, Payload};

impl Core {
    pub fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::Request(block) => self.handle_request(block),
            Event::Message(bytes) => self.handle_message(&bytes),
            Event::FinalCommitted(block) => self.handle_final_committed(block),
            Event::Shutdown => Ok(()),
        };
        log_result(result);
    }

    pub fn handle_internal(&mut self, event: InternalEvent) {
        let result = match event {
            InternalEvent::Loopback(message) | InternalEvent::Backlog(message) => {
                self.handle_checked(message)
            }
            InternalEvent::Timeout(view) => {
                self.handle_timeout(view);
                Ok(())
            }
            InternalEvent::BuildCheckpoint => {
                self.build_stable_checkpoint();
                Ok(())
            }
        };
        log_result(result);
    }

    /// Decode a message from the wire and check who signed it
    pub fn handle_message(&mut self, bytes: &[u8]) -> Result<(), ConsensusError> {
        let message = Message::decode(bytes)?;
        let data = message.payload_for_signing()?;
        self.backend.signer.check_validator_signature(
            &self.validators,
            &message.address,
            &data,
            &message.signature,
        )?;

        self.handle_checked(message)
    }

    /// Dispatch a message whose sender is already authenticated. Future
    /// messages go to the backlog.
    pub(super) fn handle_checked(&mut self, message: Message) -> Result<(), ConsensusError> {
        let payload = message.decode_payload()?;

        let result = match &payload {
            Payload::Preprepare(preprepare) => self.handle_preprepare(&message, preprepare),
            Payload::Prepare(subject) => self.handle_prepare(&message, subject),
            Payload::Commit(subject) => self.handle_commit(&message, subject),
            Payload::Checkpoint(subject) => self.handle_checkpoint(&message, subject),
            Payload::RoundChange(subject) => self.handle_round_change(&message, subject),
        };

        if let Err(ConsensusError::FutureMessage) = result {
            self.backlog.store(message, payload.view());
        }
        result
    }

    /// Re-post every backlog message the current position can act on
    pub(super) fn process_backlog(&mut self) {
        let position = self.position();
        let ready = self
            .backlog
            .drain_ready(|code, view| check_message(code, view, &position));

        for message in ready {
            if self.internal.send(InternalEvent::Backlog(message)).is_err() {
                warn!("Engine inbox closed, dropping backlog message");
            }
        }
    }

    fn handle_timeout(&mut self, view: View) {
        if view != self.current.view() {
            trace!(%view, "Ignore stale round change timer");
            return;
        }

        debug!(%view, state = %self.state, "Round change timeout");
        self.send_next_round_change();
    }
}

fn log_result(result: Result<(), ConsensusError>) {
    match result {
        Ok(()) => {}
        Err(ConsensusError::FutureMessage) => trace!("Stored future message"),
        Err(ConsensusError::OldMessage) => debug!("Dropped old message"),
        Err(e) => warn!("Failed to handle event: {}", e),
    }
}
