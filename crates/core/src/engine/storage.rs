//! Filesystem-backed output storage.

use async_trait::async_trait;
use std::path::Path;

use super::traits::OutputStorage;

/// [`OutputStorage`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

#[async_trait]
impl OutputStorage for FsStorage {
    async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
