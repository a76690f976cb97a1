use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash::hash_blake3;
use crate::error::CoreError;

pub const ADDRESS_LENGTH: usize = 20;

/// 20-byte account identifier of a validator.
///
/// Derived from the last 20 bytes of the Blake3 hash of an ed25519 public
/// key. Ordering is byte-wise, which is the order validator sets are kept in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_public_key_bytes(public_key: &[u8; 32]) -> Self {
        let digest = hash_blake3(public_key);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.0[32 - ADDRESS_LENGTH..]);
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Address::ZERO
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidAddressLength)?;
        Ok(Address(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
