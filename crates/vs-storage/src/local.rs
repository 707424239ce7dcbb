//! Local filesystem backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use vs_core::{BlobBackend, LocalStoreConfig};

use crate::backend::{BlobError, BlobResult, BlobStore, BlobTags};

/// Blobs as files under a root directory. Upload/download grants are
/// server-relative paths served by the API layer; the filesystem carries no
/// object metadata, so tags are accepted and dropped.
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &LocalStoreConfig) -> Self {
        Self::new(&config.root, &config.base_url)
    }

    /// Resolve a key to a full path, rejecting traversal.
    fn resolve_path(&self, key: &str) -> BlobResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(BlobError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_parent(&self, path: &Path) -> BlobResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current {
            if dir == self.root {
                break;
            }
            match fs::read_dir(&dir).await {
                Ok(mut entries) => match entries.next_entry().await {
                    Ok(None) => {
                        let _ = fs::remove_dir(&dir).await;
                    }
                    _ => break,
                },
                Err(_) => break,
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }
    }

    /// Count regular files under a directory, iteratively.
    async fn count_files(dir: &Path) -> BlobResult<u64> {
        let mut count = 0u64;
        let mut stack = vec![dir.to_path_buf()];
        while let Some(next) = stack.pop() {
            let mut entries = fs::read_dir(&next).await?;
            while let Some(entry) = entries.next_entry().await? {
                let ty = entry.file_type().await?;
                if ty.is_dir() {
                    stack.push(entry.path());
                } else {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write_new(&self, key: &str, data: Bytes, _tags: &BlobTags) -> BlobResult<()> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        debug!(path = ?path, size = data.len(), "blob written");
        Ok(())
    }

    async fn upload_url(&self, key: &str, _ttl: Duration) -> BlobResult<String> {
        // No presigning locally; the API layer accepts the upload itself.
        let _ = self.resolve_path(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn download_url(&self, key: &str, _ttl: Duration) -> BlobResult<String> {
        let _ = self.resolve_path(key)?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<()> {
        let src_path = self.resolve_path(src)?;
        let dst_path = self.resolve_path(dst)?;

        if !src_path.exists() {
            return Ok(());
        }
        self.ensure_parent(&dst_path).await?;
        fs::copy(&src_path, &dst_path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let path = self.resolve_path(key)?;
        if path.exists() {
            fs::remove_file(&path).await?;
            debug!(path = ?path, "blob deleted");
            self.prune_empty_parents(&path).await;
        }
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> BlobResult<u64> {
        // Segment-aligned prefixes map onto directories here.
        let path = self.resolve_path(prefix)?;
        if path.is_dir() {
            let count = Self::count_files(&path).await?;
            fs::remove_dir_all(&path).await?;
            self.prune_empty_parents(&path).await;
            debug!(prefix = prefix, removed = count, "prefix deleted");
            Ok(count)
        } else if path.is_file() {
            fs::remove_file(&path).await?;
            self.prune_empty_parents(&path).await;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.resolve_path(key)?.is_file())
    }

    async fn size(&self, key: &str) -> BlobResult<Option<i64>> {
        let path = self.resolve_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len() as i64)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stamp(&self, key: &str, _tags: &BlobTags) -> BlobResult<()> {
        let _ = self.resolve_path(key)?;
        Ok(())
    }

    fn kind(&self) -> BlobBackend {
        BlobBackend::Local
    }
}
