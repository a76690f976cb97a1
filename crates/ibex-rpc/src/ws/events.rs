use std::sync::Arc;

use ibex_consensus::{CoreStatus, EngineHandle};
use ibex_core::Block;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// WebSocket event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    BlockCommitted {
        height: u64,
        hash: String,
        proposer: String,
        timestamp: u64,
    },
    RoundChanged {
        validator: String,
        sequence: u64,
        round: u64,
        proposer: Option<String>,
    },
}

impl WsEvent {
    pub fn block_committed(block: &Block) -> Self {
        WsEvent::BlockCommitted {
            height: block.number(),
            hash: block.hash().to_hex(),
            proposer: block.header.proposer.to_hex(),
            timestamp: block.header.timestamp,
        }
    }

    pub fn round_changed(status: &CoreStatus) -> Self {
        WsEvent::RoundChanged {
            validator: status.address.clone(),
            sequence: status.sequence,
            round: status.round,
            proposer: status.proposer.clone(),
        }
    }
}

/// Event broadcaster for WebSocket clients
pub struct EventBroadcaster {
    sender: broadcast::Sender<WsEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBroadcaster { sender }
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: WsEvent) {
        if let Ok(count) = self.sender.send(event.clone()) {
            debug!("Broadcast {:?} to {} clients", event, count);
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Announce every block `handle`'s engine commits. Ends when the engine stops.
pub fn forward_commits(handle: &EngineHandle, broadcaster: Arc<EventBroadcaster>) -> JoinHandle<()> {
    let mut committed = handle.subscribe_committed();
    tokio::spawn(async move {
        loop {
            match committed.recv().await {
                Ok(block) => broadcaster.broadcast(WsEvent::block_committed(&block)),
                Err(RecvError::Lagged(n)) => warn!("Event forwarder lagged {} commits", n),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Announce every view change of `handle`'s engine. Ends when the engine stops.
pub fn forward_round_changes(
    handle: &EngineHandle,
    broadcaster: Arc<EventBroadcaster>,
) -> JoinHandle<()> {
    let mut status = handle.subscribe_status();
    tokio::spawn(async move {
        let mut last = None;
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            let view = (current.sequence, current.round);
            if last != Some(view) {
                last = Some(view);
                broadcaster.broadcast(WsEvent::round_changed(&current));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibex_core::Address;

    #[tokio::test]
    async fn test_broadcast() {
        let broadcaster = EventBroadcaster::new(100);
        let mut rx = broadcaster.subscribe();

        let block = Block::new(1, Block::genesis(0).hash(), 1000, Address::ZERO, b"test".to_vec());
        broadcaster.broadcast(WsEvent::block_committed(&block));

        match rx.recv().await.unwrap() {
            WsEvent::BlockCommitted { height, hash, .. } => {
                assert_eq!(height, 1);
                assert_eq!(hash, block.hash().to_hex());
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new(100);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        assert_eq!(broadcaster.subscriber_count(), 2);

        let status = CoreStatus {
            sequence: 3,
            round: 1,
            ..CoreStatus::default()
        };
        broadcaster.broadcast(WsEvent::round_changed(&status));

        assert_eq!(rx1.recv().await.unwrap(), rx2.recv().await.unwrap());
    }

    #[test]
    fn test_event_json_shape() {
        let status = CoreStatus {
            address: "ab".to_string(),
            sequence: 2,
            ..CoreStatus::default()
        };
        let json = serde_json::to_value(WsEvent::round_changed(&status)).unwrap();
        assert_eq!(json["type"], "RoundChanged");
        assert_eq!(json["data"]["validator"], "ab");
        assert_eq!(json["data"]["sequence"], 2);
    }
}
