use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the state machine is within the current view.
///
/// Ordered: a later state has made strictly more progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum State {
    AcceptRequest,
    Preprepared,
    Prepared,
    Committed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::AcceptRequest => "Accept request",
            State::Preprepared => "Preprepared",
            State::Prepared => "Prepared",
            State::Committed => "Committed",
        };
        f.write_str(name)
    }
}
