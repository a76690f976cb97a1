use std::collections::BTreeMap;

use ibex_core::View;
use serde::{Deserialize, Serialize};

use crate::state::State;

/// Diagnostic dump of one engine, published after every event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStatus {
    pub address: String,
    pub sequence: u64,
    pub round: u64,
    pub state: Option<State>,
    pub proposer: Option<String>,
    pub waiting_for_round_change: bool,
    pub locked_hash: Option<String>,
    pub prepares: usize,
    pub commits: usize,
    /// RoundChange votes per "sequence/round"
    pub round_change_votes: BTreeMap<String, usize>,
    /// Backlog length per sender
    pub backlog: BTreeMap<String, usize>,
    pub pending_requests: usize,
    pub archived_snapshots: usize,
    pub stable_checkpoint: Option<View>,
    pub validators: usize,
}
