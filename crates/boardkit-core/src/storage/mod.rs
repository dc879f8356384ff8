//! Persistence endpoint for board records.

mod autosave;
mod file;
mod memory;

pub use autosave::{AutoSaveManager, DEFAULT_AUTOSAVE_INTERVAL_SECS, LAST_BOARD_KEY};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::board::BoardRecord;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Board not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future returned by storage backends.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for board storage backends.
///
/// Records are stored under a key, normally the board id.
pub trait Storage: Send + Sync {
    /// Save a record under `id`.
    fn save(&self, id: &str, record: &BoardRecord) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the record stored under `id`.
    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<BoardRecord>>;

    /// Delete a record. Deleting a missing key succeeds.
    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all keys.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a record exists.
    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

#[cfg(test)]
pub(crate) fn sample_record(id: &str, name: &str) -> BoardRecord {
    use crate::board::{Board, OwnerScope};

    let mut board = Board::new(name, OwnerScope::tenant("tenant-1"));
    board.id = id.to_string();
    board.to_record().expect("empty board serializes")
}
