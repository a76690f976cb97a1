//! Ibex Storage - Durable key/value persistence
//!
//! The consensus engine persists exactly one record (the stable
//! checkpoint); the host node may share the same store for its own keys.

pub mod error;
pub mod storage;

pub use error::StorageError;
pub use storage::{FileStorage, MemoryStorage, Storage};
