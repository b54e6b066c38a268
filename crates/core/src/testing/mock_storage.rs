//! Mock output storage for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::OutputStorage;

/// A storage call recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Exists(PathBuf),
    Remove(PathBuf),
}

/// Mock implementation of the OutputStorage trait.
///
/// Tracks which artifacts exist, records every call, and can be told to
/// fail lookups or removals.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    artifacts: Arc<RwLock<HashSet<PathBuf>>>,
    calls: Arc<RwLock<Vec<StorageCall>>>,
    exists_error: Arc<RwLock<Option<io::ErrorKind>>>,
    remove_error: Arc<RwLock<Option<io::ErrorKind>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend an artifact exists at `path`.
    pub async fn add_artifact(&self, path: impl AsRef<Path>) {
        self.artifacts
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    pub async fn has_artifact(&self, path: impl AsRef<Path>) -> bool {
        self.artifacts.read().await.contains(path.as_ref())
    }

    /// Make every existence check fail with `kind`.
    pub async fn fail_exists(&self, kind: io::ErrorKind) {
        *self.exists_error.write().await = Some(kind);
    }

    /// Make every removal fail with `kind`.
    pub async fn fail_remove(&self, kind: io::ErrorKind) {
        *self.remove_error.write().await = Some(kind);
    }

    /// Get all recorded calls.
    pub async fn calls(&self) -> Vec<StorageCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl OutputStorage for MockStorage {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        self.calls
            .write()
            .await
            .push(StorageCall::Exists(path.to_path_buf()));

        if let Some(kind) = *self.exists_error.read().await {
            return Err(io::Error::new(kind, "mock exists failure"));
        }
        Ok(self.artifacts.read().await.contains(path))
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.calls
            .write()
            .await
            .push(StorageCall::Remove(path.to_path_buf()));

        if let Some(kind) = *self.remove_error.read().await {
            return Err(io::Error::new(kind, "mock remove failure"));
        }
        if self.artifacts.write().await.remove(path) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such artifact"))
        }
    }
}
