//! Periodic persistence of the board being edited.

use crate::board::{Board, BoardRecord};
use crate::storage::{Storage, StorageError, StorageResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Key under which the most recently saved board is mirrored.
pub const LAST_BOARD_KEY: &str = "__last_board__";

/// Tracks unsaved changes and writes the board out when the interval has elapsed.
pub struct AutoSaveManager<S: Storage + ?Sized> {
    storage: Arc<S>,
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
    current_board_id: Option<String>,
}

impl<S: Storage + ?Sized> AutoSaveManager<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            last_save: None,
            dirty: false,
            current_board_id: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the board as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Key used for the next save. Defaults to the board's own id.
    pub fn set_board_id(&mut self, id: Option<String>) {
        self.current_board_id = id;
    }

    pub fn board_id(&self) -> Option<&str> {
        self.current_board_id.as_deref()
    }

    /// Dirty and either never saved or the interval has elapsed.
    pub fn should_save(&self) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Save the board if needed. Returns true if a save was performed.
    pub async fn maybe_save(&mut self, board: &Board) -> StorageResult<bool> {
        if !self.should_save() {
            return Ok(false);
        }
        self.save(board).await?;
        Ok(true)
    }

    /// Save the board immediately.
    pub async fn save(&mut self, board: &Board) -> StorageResult<()> {
        let record = board
            .to_record()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let id = self
            .current_board_id
            .clone()
            .unwrap_or_else(|| board.id.clone());

        self.storage.save(&id, &record).await?;
        self.storage.save(LAST_BOARD_KEY, &record).await?;
        log::debug!("Auto-saved board {} ({} items)", id, board.len());

        self.last_save = Some(Instant::now());
        self.dirty = false;
        Ok(())
    }

    /// Load a record and make it the current board.
    pub async fn load(&mut self, id: &str) -> StorageResult<BoardRecord> {
        let record = self.storage.load(id).await?;
        self.current_board_id = Some(id.to_string());
        self.dirty = false;
        self.last_save = Some(Instant::now());
        Ok(record)
    }

    /// Load the most recently saved board, if any.
    pub async fn load_last(&mut self) -> Option<BoardRecord> {
        let record = self.storage.load(LAST_BOARD_KEY).await.ok()?;
        self.current_board_id = Some(record.id.clone());
        self.dirty = false;
        self.last_save = Some(Instant::now());
        Some(record)
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        self.storage.delete(id).await
    }

    /// List saved board keys, without the last-board mirror.
    pub async fn list_boards(&self) -> StorageResult<Vec<String>> {
        let mut ids = self.storage.list().await?;
        ids.retain(|id| id != LAST_BOARD_KEY);
        Ok(ids)
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }
}
