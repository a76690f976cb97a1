use ibex_core::{Address, CoreError};
use ibex_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The message is ahead of local state; callers store it in the backlog.
    #[error("Future message")]
    FutureMessage,

    #[error("Old message")]
    OldMessage,

    #[error("Invalid message")]
    InvalidMessage,

    #[error("Message not from the proposer")]
    NotFromProposer,

    #[error("Preprepare without a proposal")]
    NilProposal,

    #[error("Subject does not match the current preprepare")]
    SubjectNotMatched,

    #[error("No matching validator for {0}")]
    NoMatchingValidator(Address),

    #[error("Invalid signature from {0}")]
    InvalidSignature(Address),

    #[error("Round change for sequence {got} while at sequence {current}")]
    InvalidRoundChange { current: u64, got: u64 },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sealing stopped")]
    Stopped,

    #[error("Another block was committed at height {0}")]
    Superseded(u64),

    #[error("Consensus engine stopped")]
    EngineStopped,

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
