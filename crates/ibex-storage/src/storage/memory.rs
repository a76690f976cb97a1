use std::collections::BTreeMap;

use super::Storage;
use crate::error::StorageError;

/// In-memory storage, used by tests and ephemeral nodes
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.pending_writes.get(key) {
            Some(pending) => pending.clone(),
            None => self.data.get(key).cloned(),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.pending_writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.pending_writes.insert(key.to_vec(), None);
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        for (key, value) in std::mem::take(&mut self.pending_writes) {
            match value {
                Some(v) => {
                    self.data.insert(key, v);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending_writes.clear();
    }
}
