use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ibex_core::{Address, Block};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::Config;
use crate::error::ConsensusError;
use crate::events::{Event, InternalEvent};
use crate::machine::Core;
use crate::status::CoreStatus;

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Channel an engine reads its external events from.
///
/// Created before the engine so the transport and the chain can hold the
/// sender.
pub fn inbox() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

const COMMITTED_CHANNEL_CAPACITY: usize = 64;

/// One validator's consensus task
pub struct Engine {
    core: Core,
    events: EventReceiver,
    internal: mpsc::UnboundedReceiver<InternalEvent>,
    status: watch::Sender<CoreStatus>,
}

impl Engine {
    /// Spawn the engine on the current tokio runtime
    pub fn spawn(
        config: Config,
        backend: Backend,
        inbox: (EventSender, EventReceiver),
    ) -> (EngineHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = inbox;
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (committed_tx, _) = broadcast::channel(COMMITTED_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(CoreStatus::default());
        let address = backend.address();

        let core = Core::new(config, backend, internal_tx, committed_tx.clone());
        let engine = Engine {
            core,
            events: events_rx,
            internal: internal_rx,
            status: status_tx,
        };
        let task = tokio::spawn(engine.run());

        let handle = EngineHandle {
            address,
            events: events_tx,
            committed: committed_tx,
            status: status_rx,
        };
        (handle, task)
    }

    /// Drain both channels until shutdown; self-posted events go first
    async fn run(mut self) {
        self.core.start();
        self.publish_status();

        loop {
            tokio::select! {
                biased;

                Some(event) = self.internal.recv() => {
                    self.core.handle_internal(event);
                }
                event = self.events.recv() => match event {
                    Some(Event::Shutdown) | None => break,
                    Some(event) => self.core.handle_event(event),
                },
            }
            self.publish_status();
        }

        self.core.stop();
        info!("Consensus engine stopped");
    }

    fn publish_status(&self) {
        let status = self.core.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    address: Address,
    events: EventSender,
    committed: broadcast::Sender<Block>,
    status: watch::Receiver<CoreStatus>,
}

impl EngineHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sender for the engine inbox, for transports that deliver to it
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    pub fn post(&self, event: Event) -> Result<(), ConsensusError> {
        self.events.send(event).map_err(|_| ConsensusError::EngineStopped)
    }

    /// Ask the engine to agree on `block`
    pub fn request(&self, block: Block) -> Result<(), ConsensusError> {
        self.post(Event::Request(block))
    }

    /// Deliver an encoded consensus message received from a peer
    pub fn deliver(&self, bytes: Vec<u8>) -> Result<(), ConsensusError> {
        self.post(Event::Message(bytes))
    }

    pub fn final_committed(&self, block: Block) -> Result<(), ConsensusError> {
        self.post(Event::FinalCommitted(block))
    }

    pub fn shutdown(&self) -> Result<(), ConsensusError> {
        self.post(Event::Shutdown)
    }

    pub fn status(&self) -> CoreStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CoreStatus> {
        self.status.clone()
    }

    /// Blocks committed by this engine, in commit order
    pub fn subscribe_committed(&self) -> broadcast::Receiver<Block> {
        self.committed.subscribe()
    }

    /// Propose `block` once its timestamp is reached and wait until it is
    /// committed.
    ///
    /// Fails with `Superseded` when another block is committed at the same
    /// height, and with `Stopped` as soon as `stop` resolves.
    pub async fn seal<F>(&self, block: Block, stop: F) -> Result<Block, ConsensusError>
    where
        F: Future<Output = ()>,
    {
        let hash = block.hash();
        let number = block.number();
        let mut committed = self.committed.subscribe();
        tokio::pin!(stop);

        let delay = Duration::from_millis(block.header.timestamp.saturating_sub(now_millis()));
        tokio::select! {
            _ = &mut stop => return Err(ConsensusError::Stopped),
            _ = tokio::time::sleep(delay) => {}
        }

        debug!(number, hash = %hash.short(), "Request sealing");
        self.request(block)?;

        loop {
            tokio::select! {
                // A commit that races the stop signal still counts
                biased;

                result = committed.recv() => match result {
                    Ok(block) if block.hash() == hash => return Ok(block),
                    Ok(block) if block.number() >= number => {
                        return Err(ConsensusError::Superseded(block.number()));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Commit notifications lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return Err(ConsensusError::EngineStopped),
                },
                _ = &mut stop => return Err(ConsensusError::Stopped),
                _ = self.events.closed() => return Err(ConsensusError::EngineStopped),
            }
        }
    }
}

/// Unix time in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
