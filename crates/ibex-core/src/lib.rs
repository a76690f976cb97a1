//! Ibex Core - Primitive types, cryptography, and serialization
//!
//! This crate provides the hashes, addresses, keys, blocks and consensus
//! views shared by every other Ibex crate.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{hash_blake3, sign, verify, Address, Hash, KeyPair, PublicKey, SecretKey, Sig};
pub use error::CoreError;
pub use types::*;
