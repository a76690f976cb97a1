use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Address, Hash};

/// Block header. The consensus engine never looks inside it beyond the
/// number, the parent hash and the block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number (0 for genesis); the consensus sequence it is agreed at
    pub number: u64,
    /// Hash of the parent block (zeros for genesis)
    pub parent_hash: Hash,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Address of the validator that built the block
    pub proposer: Address,
    /// Blake3 hash of the opaque payload
    pub payload_hash: Hash,
}

impl BlockHeader {
    /// Hash over a fixed byte layout: number, parent, timestamp, proposer, payload hash
    pub fn hash(&self) -> Hash {
        let mut data = Vec::with_capacity(8 + 32 + 8 + 20 + 32);
        data.extend_from_slice(&self.number.to_be_bytes());
        data.extend_from_slice(&self.parent_hash.0);
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&self.proposer.0);
        data.extend_from_slice(&self.payload_hash.0);
        hash_blake3(&data)
    }
}

/// A block: the unit of agreement handed to consensus as a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(
        number: u64,
        parent_hash: Hash,
        timestamp: u64,
        proposer: Address,
        payload: Vec<u8>,
    ) -> Self {
        let header = BlockHeader {
            number,
            parent_hash,
            timestamp,
            proposer,
            payload_hash: hash_blake3(&payload),
        };
        Block { header, payload }
    }

    /// Genesis block every chain starts from
    pub fn genesis(timestamp: u64) -> Self {
        Block::new(0, Hash::ZERO, timestamp, Address::ZERO, Vec::new())
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Check the payload matches the header commitment
    pub fn verify_payload(&self) -> bool {
        hash_blake3(&self.payload) == self.header.payload_hash
    }
}
