use ibex_core::{serialize, Preprepare, View};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::Store;
use crate::error::ConsensusError;
use crate::messages::Message;
use crate::snapshot::Snapshot;

/// Store key of the persisted stable checkpoint
pub const STABLE_CHECKPOINT_KEY: &str = "ibex/consensus/StableCheckpoint";

/// The one record that survives a restart: the newest snapshot a quorum
/// has checkpointed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableCheckpoint {
    pub round: u64,
    pub sequence: u64,
    pub preprepare: Option<Preprepare>,
    pub prepares: Vec<Message>,
    pub commits: Vec<Message>,
    pub checkpoints: Vec<Message>,
}

impl StableCheckpoint {
    pub fn view(&self) -> View {
        View::new(self.sequence, self.round)
    }
}

impl From<&Snapshot> for StableCheckpoint {
    fn from(snapshot: &Snapshot) -> Self {
        StableCheckpoint {
            round: snapshot.round(),
            sequence: snapshot.sequence(),
            preprepare: snapshot.preprepare.clone(),
            prepares: snapshot.prepares.values().cloned().collect(),
            commits: snapshot.commits.values().cloned().collect(),
            checkpoints: snapshot.checkpoints.values().cloned().collect(),
        }
    }
}

/// Which snapshot a checkpoint vote belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTarget {
    Current,
    Archived(usize),
}

/// History of finalized snapshots, compacted into a stable checkpoint
/// every `period` sequences
#[derive(Debug)]
pub struct CheckpointManager {
    /// Ascending by sequence
    history: Vec<Snapshot>,
    period: u64,
    stable: Option<StableCheckpoint>,
}

impl CheckpointManager {
    pub fn new(period: u64) -> Self {
        CheckpointManager {
            history: Vec::new(),
            period,
            stable: None,
        }
    }

    /// Load the persisted stable checkpoint, if there is one
    pub fn restore(&mut self, store: &dyn Store) -> Result<Option<&StableCheckpoint>, ConsensusError> {
        if let Some(bytes) = store.restore(STABLE_CHECKPOINT_KEY)? {
            let stable: StableCheckpoint = serialize::from_bytes(&bytes)?;
            info!("Restored stable checkpoint at {}", stable.view());
            self.stable = Some(stable);
        }
        Ok(self.stable.as_ref())
    }

    /// Append a finalized snapshot
    pub fn archive(&mut self, snapshot: Snapshot) {
        if let Some(last) = self.history.last() {
            if last.sequence() >= snapshot.sequence() {
                debug!(sequence = snapshot.sequence(), "Snapshot already archived");
                return;
            }
        }
        self.history.push(snapshot);
    }

    /// Whether finalizing `sequence` should trigger a stable checkpoint build
    pub fn is_due(&self, sequence: u64) -> bool {
        self.period > 0 && sequence % self.period == 0
    }

    /// Find the snapshot a checkpoint for `sequence` votes on
    pub fn locate(&self, current: u64, sequence: u64) -> Result<CheckpointTarget, ConsensusError> {
        if sequence == current {
            return Ok(CheckpointTarget::Current);
        }
        if sequence > current {
            return Err(ConsensusError::InvalidMessage);
        }

        self.history
            .binary_search_by_key(&sequence, Snapshot::sequence)
            .map(CheckpointTarget::Archived)
            .map_err(|_| ConsensusError::InvalidMessage)
    }

    pub fn archived_mut(&mut self, index: usize) -> Option<&mut Snapshot> {
        self.history.get_mut(index)
    }

    /// Persist the newest archived snapshot with more than `2f` checkpoint
    /// votes and drop it together with everything older.
    ///
    /// Returns the view of the new stable checkpoint, or `None` when no
    /// snapshot has a quorum yet. On a store failure history is kept.
    pub fn build_stable(&mut self, f: usize, store: &dyn Store) -> Result<Option<View>, ConsensusError> {
        let Some(index) = self
            .history
            .iter()
            .rposition(|s| s.checkpoints.size() > 2 * f)
        else {
            return Ok(None);
        };

        let stable = StableCheckpoint::from(&self.history[index]);
        store.save(STABLE_CHECKPOINT_KEY, &serialize::to_bytes(&stable)?)?;

        let view = stable.view();
        self.history.drain(..=index);
        self.stable = Some(stable);
        Ok(Some(view))
    }

    pub fn stable(&self) -> Option<&StableCheckpoint> {
        self.stable.as_ref()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
