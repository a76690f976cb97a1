use ibex_core::{Block, View};

use crate::messages::Message;

/// Events the host posts to an engine
#[derive(Debug, Clone)]
pub enum Event {
    /// A locally built proposal to agree on
    Request(Block),
    /// An encoded consensus message from the network
    Message(Vec<u8>),
    /// The host chain has finalized a block
    FinalCommitted(Block),
    /// Stop the engine task
    Shutdown,
}

/// Events the engine posts to itself
#[derive(Debug)]
pub(crate) enum InternalEvent {
    /// Our own broadcast, delivered locally
    Loopback(Message),
    /// A backlog message that became actionable
    Backlog(Message),
    /// The round-change timer for a view fired
    Timeout(View),
    BuildCheckpoint,
}
