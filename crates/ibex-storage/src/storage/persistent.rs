use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ibex_core::serialize;
use tracing::debug;

use super::Storage;
use crate::error::StorageError;

/// File-backed storage: the whole map is rewritten on every commit
/// through a temporary file and an atomic rename.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl FileStorage {
    /// Open the store at `path`, loading existing contents if the file exists
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serialize::from_bytes(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        debug!("Opened {:?} with {} keys", path, data.len());

        Ok(FileStorage {
            path,
            data,
            pending_writes: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_to_disk(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        let bytes = serialize::to_bytes(&self.data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}

impl Storage for FileStorage {
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
        self.flush_to_disk()
    }

    fn rollback(&mut self) {
        self.pending_writes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("ibex-storage-{}-{}", name, std::process::id()))
            .join("store.bin")
    }

    #[test]
    fn test_commit_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);

        let mut storage = FileStorage::open(&path).unwrap();
        storage.put(b"ibex/StableCheckpoint", b"record");
        storage.commit().unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get(b"ibex/StableCheckpoint"),
            Some(b"record".to_vec())
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_uncommitted_writes_not_persisted() {
        let path = temp_path("uncommitted");
        let _ = fs::remove_file(&path);

        let mut storage = FileStorage::open(&path).unwrap();
        storage.put(b"key", b"value");
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(b"key"), None);
    }
}
