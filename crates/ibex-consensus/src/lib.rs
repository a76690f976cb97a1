//! Ibex Consensus - Byzantine fault tolerant block agreement
//!
//! A PBFT-style state machine (Preprepare, Prepare, Commit) with a
//! round-change sub-protocol for liveness and periodic stable checkpoints.
//! The engine runs on one tokio task per validator and talks to the rest of
//! the node through the capability traits in [`backend`].

pub mod backend;
pub mod backlog;
pub mod checkpoint;
pub mod config;
mod machine;
pub mod engine;
pub mod error;
pub mod events;
pub mod local;
pub mod message_set;
pub mod messages;
pub mod round_change_set;
pub mod snapshot;
pub mod state;
pub mod status;
mod timer;
pub mod validator;

pub use backend::{Backend, Chain, Identity, KeySigner, Signer, StorageStore, Store, Transport};
pub use backlog::{check_message, Backlog, Position};
pub use checkpoint::{CheckpointManager, CheckpointTarget, StableCheckpoint, STABLE_CHECKPOINT_KEY};
pub use config::{Config, ProposerPolicy};
pub use engine::{inbox, now_millis, Engine, EngineHandle, EventReceiver, EventSender};
pub use error::ConsensusError;
pub use events::Event;
pub use local::{LocalCluster, LocalNetwork, LocalNode, LocalTransport, MemoryChain};
pub use message_set::MessageSet;
pub use messages::{Message, MessageCode, Payload};
pub use round_change_set::RoundChangeSet;
pub use snapshot::Snapshot;
pub use state::State;
pub use status::CoreStatus;
pub use validator::{Validator, ValidatorSet};
