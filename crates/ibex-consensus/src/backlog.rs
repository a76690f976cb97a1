use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use ibex_core::{Address, View};
use tracing::{trace, warn};

use crate::error::ConsensusError;
use crate::messages::{Message, MessageCode};
use crate::state::State;

/// Where the local state machine stands; the reference point for
/// classifying incoming messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub view: View,
    pub state: State,
    pub waiting_for_round_change: bool,
}

/// Classify a message with `code` for `view` against the local position.
///
/// `Ok` means actionable now, `FutureMessage` means keep it for later,
/// anything else means drop it.
pub fn check_message(code: MessageCode, view: &View, position: &Position) -> Result<(), ConsensusError> {
    let current = &position.view;

    match code {
        // Rounds ahead of ours must still be counted
        MessageCode::RoundChange => {
            if view.sequence > current.sequence {
                Err(ConsensusError::FutureMessage)
            } else {
                Ok(())
            }
        }
        // Checkpoints are never buffered ahead of the current sequence
        MessageCode::Checkpoint if view.sequence > current.sequence => Err(ConsensusError::InvalidMessage),
        // Older sequences are matched against archived snapshots
        MessageCode::Checkpoint if view.sequence < current.sequence => Ok(()),
        _ => {
            if view > current {
                return Err(ConsensusError::FutureMessage);
            }
            if view < current {
                return Err(ConsensusError::OldMessage);
            }
            if position.waiting_for_round_change {
                return Err(ConsensusError::FutureMessage);
            }
            if position.state == State::AcceptRequest && code != MessageCode::Preprepare {
                return Err(ConsensusError::FutureMessage);
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    view: View,
    code: MessageCode,
    seq: u64,
}

#[derive(Debug)]
struct Entry {
    key: Key,
    message: Message,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Per-sender queues of messages that arrived ahead of local state.
///
/// Each queue pops the lowest (sequence, round) first; ties fall back to
/// message code and then arrival order.
#[derive(Debug)]
pub struct Backlog {
    self_address: Address,
    queues: HashMap<Address, BinaryHeap<Reverse<Entry>>>,
    counter: u64,
}

impl Backlog {
    pub fn new(self_address: Address) -> Self {
        Backlog {
            self_address,
            queues: HashMap::new(),
            counter: 0,
        }
    }

    /// Queue `message` whose payload refers to `view`. Our own messages are
    /// never queued.
    pub fn store(&mut self, message: Message, view: View) {
        if message.address == self.self_address {
            warn!(%view, "Backlog from self");
            return;
        }

        trace!(from = %message.address, code = ?message.code, %view, "Store future message");

        let key = Key {
            view,
            code: message.code,
            seq: self.counter,
        };
        self.counter += 1;

        self.queues
            .entry(message.address)
            .or_default()
            .push(Reverse(Entry { key, message }));
    }

    /// Pop every message `check` no longer considers future.
    ///
    /// Per sender, popping stops at the first message that is still future;
    /// it goes back on the queue. Messages `check` rejects for any other
    /// reason are dropped.
    pub fn drain_ready<F>(&mut self, mut check: F) -> Vec<Message>
    where
        F: FnMut(MessageCode, &View) -> Result<(), ConsensusError>,
    {
        let mut ready = Vec::new();

        for queue in self.queues.values_mut() {
            while let Some(Reverse(entry)) = queue.pop() {
                match check(entry.message.code, &entry.key.view) {
                    Ok(()) => {
                        trace!(from = %entry.message.address, code = ?entry.message.code, view = %entry.key.view, "Replay backlog message");
                        ready.push(entry.message);
                    }
                    Err(ConsensusError::FutureMessage) => {
                        queue.push(Reverse(entry));
                        break;
                    }
                    Err(err) => {
                        trace!(from = %entry.message.address, view = %entry.key.view, %err, "Drop backlog message");
                    }
                }
            }
        }

        self.queues.retain(|_, queue| !queue.is_empty());
        ready
    }

    /// Queue length per sender
    pub fn sizes(&self) -> BTreeMap<Address, usize> {
        self.queues
            .iter()
            .map(|(address, queue)| (*address, queue.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(BinaryHeap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
