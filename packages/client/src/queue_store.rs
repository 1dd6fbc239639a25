//! Local persistence of the offline/retry move queue.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{error::QueueStoreError, sync::QueuedMove};

/// Persists the queued moves so they survive a client restart.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn load(&self) -> Result<Vec<QueuedMove>, QueueStoreError>;

    /// Replace the stored queue with `moves`.
    async fn save(&self, moves: &[QueuedMove]) -> Result<(), QueueStoreError>;
}

/// JSON file store. Writes go to a sibling temp file first and are renamed
/// into place.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self) -> Result<Vec<QueuedMove>, QueueStoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn save(&self, moves: &[QueuedMove]) -> Result<(), QueueStoreError> {
        let json = serde_json::to_string_pretty(moves)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory store, for tests and for clients run without a queue file.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    moves: Mutex<Vec<QueuedMove>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<QueuedMove> {
        self.moves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> Result<Vec<QueuedMove>, QueueStoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, moves: &[QueuedMove]) -> Result<(), QueueStoreError> {
        *self
            .moves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = moves.to_vec();
        Ok(())
    }
}
