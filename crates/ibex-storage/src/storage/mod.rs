pub mod memory;
pub mod persistent;

use crate::error::StorageError;

/// Key/value storage with staged writes.
///
/// Writes are buffered until `commit`; `rollback` drops them. Readers see
/// staged writes before committed ones.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn put(&mut self, key: &[u8], value: &[u8]);

    fn delete(&mut self, key: &[u8]);

    /// Make staged writes durable
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Drop staged writes
    fn rollback(&mut self);

    fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

pub use memory::MemoryStorage;
pub use persistent::FileStorage;
