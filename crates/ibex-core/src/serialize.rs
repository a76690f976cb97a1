use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Serialize to deterministic bincode bytes.
///
/// Every signing pre-image and wire payload goes through this function so
/// that signers and verifiers agree on the exact byte layout.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from bincode bytes
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Serialize to JSON string (for RPC and config files)
pub fn to_json<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Serialize to pretty JSON string
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from JSON string
pub fn from_json<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, CoreError> {
    serde_json::from_str(json).map_err(|e| CoreError::Deserialization(e.to_string()))
}
