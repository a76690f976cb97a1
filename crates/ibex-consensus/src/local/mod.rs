//! In-process deployment: a channel-based network, an in-memory chain and
//! a cluster builder wiring engines together. Used by the devnet node and
//! by tests.

mod chain;
mod cluster;
mod network;

pub use chain::MemoryChain;
pub use cluster::{LocalCluster, LocalNode};
pub use network::{LocalNetwork, LocalTransport};
