use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Core error: {0}")]
    Core(#[from] ibex_core::CoreError),
}
