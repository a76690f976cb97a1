use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use ibex_core::Address;
use tracing::trace;

use crate::backend::Transport;
use crate::engine::EventSender;
use crate::error::ConsensusError;
use crate::events::Event;

#[derive(Default)]
struct Peers {
    inboxes: HashMap<Address, EventSender>,
    offline: HashSet<Address>,
}

/// Channels between engines running in one process.
///
/// An offline peer neither sends nor receives; its traffic is dropped.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    peers: Arc<RwLock<Peers>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: Address, inbox: EventSender) {
        if let Ok(mut peers) = self.peers.write() {
            peers.inboxes.insert(address, inbox);
        }
    }

    pub fn set_offline(&self, address: Address, offline: bool) {
        if let Ok(mut peers) = self.peers.write() {
            if offline {
                peers.offline.insert(address);
            } else {
                peers.offline.remove(&address);
            }
        }
    }

    /// Transport sending as `address`
    pub fn endpoint(&self, address: Address) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            address,
        }
    }
}

/// One validator's view of a [`LocalNetwork`]
#[derive(Clone)]
pub struct LocalTransport {
    network: LocalNetwork,
    address: Address,
}

impl Transport for LocalTransport {
    fn send(&self, target: &Address, payload: Vec<u8>) -> Result<(), ConsensusError> {
        let peers = self
            .network
            .peers
            .read()
            .map_err(|_| ConsensusError::Transport("peer table lock poisoned".to_string()))?;

        if peers.offline.contains(&self.address) || peers.offline.contains(target) {
            trace!(from = %self.address, to = %target, "Drop message for offline peer");
            return Ok(());
        }

        let inbox = peers
            .inboxes
            .get(target)
            .ok_or_else(|| ConsensusError::Transport(format!("unknown peer {}", target)))?;
        inbox
            .send(Event::Message(payload))
            .map_err(|_| ConsensusError::Transport(format!("peer {} stopped", target)))
    }
}
