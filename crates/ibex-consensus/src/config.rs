use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the next proposer is picked from the last one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposerPolicy {
    /// Move one validator forward every sequence and every round
    #[default]
    RoundRobin,
    /// Keep the last proposer until a round change moves it
    Sticky,
}

/// Consensus engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Round-change timer in milliseconds
    pub request_timeout_ms: u64,
    /// Minimum time between blocks in milliseconds
    pub block_period_ms: u64,
    /// Sequences between stable checkpoint builds (0 disables them)
    pub checkpoint_period: u64,
    /// Proposer selection policy
    pub proposer_policy: ProposerPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            request_timeout_ms: 10_000,
            block_period_ms: 1_000,
            checkpoint_period: 10,
            proposer_policy: ProposerPolicy::RoundRobin,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn block_period(&self) -> Duration {
        Duration::from_millis(self.block_period_ms)
    }
}
