//! The storage backend contract.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use vs_core::BlobBackend;

/// Storage errors
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Malformed blob key: {0}")]
    InvalidKey(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("Storage backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("Storage misconfigured: {0}")]
    Config(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Descriptive metadata stamped onto a blob. Values are opaque to the
/// backend; client-direct uploads cannot set these, so `stamp` rewrites
/// them after validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobTags {
    pub file_name: Option<String>,
    pub owner: Option<String>,
}

impl BlobTags {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Tag entries as (name, value) pairs, for backends that carry them as
    /// object metadata headers.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(name) = &self.file_name {
            out.push(("file-name", name.as_str()));
        }
        if let Some(owner) = &self.owner {
            out.push(("owner", owner.as_str()));
        }
        out
    }
}

/// Result of a size validation.
///
/// `(false, None)` when the object is absent, `(false, Some(actual))` when
/// the actual size falls outside the leeway window, `(true, Some(actual))`
/// otherwise. Mismatches are data, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCheck {
    pub ok: bool,
    pub actual: Option<i64>,
}

impl SizeCheck {
    pub fn missing() -> Self {
        Self { ok: false, actual: None }
    }
}

/// A storage backend for encrypted blobs.
///
/// Contract notes:
/// - `copy`, `rename`, and `delete` are silent no-ops when the source or
///   target object is absent. The share saga's rollback safety depends on
///   this.
/// - Prefixes passed to `delete_by_prefix` are segment-aligned: everything
///   under `{prefix}/` is removed.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a committed object.
    async fn write_new(&self, key: &str, data: Bytes, tags: &BlobTags) -> BlobResult<()>;

    /// Write a staged (uncommitted) object. The staging location is carried
    /// by the key itself; backends without a separate staging area store it
    /// like any other object.
    async fn write_staged(&self, key: &str, data: Bytes, tags: &BlobTags) -> BlobResult<()> {
        self.write_new(key, data, tags).await
    }

    /// Time-limited grant for a client-direct upload. The local backend
    /// returns a server-relative path instead of a signed URL.
    async fn upload_url(&self, key: &str, ttl: Duration) -> BlobResult<String>;

    /// Time-limited grant for a client-direct download.
    async fn download_url(&self, key: &str, ttl: Duration) -> BlobResult<String>;

    /// Copy an object. No-op when the source is absent.
    async fn copy(&self, src: &str, dst: &str) -> BlobResult<()>;

    /// Move an object. No-op when the source is absent.
    async fn rename(&self, src: &str, dst: &str) -> BlobResult<()> {
        self.copy(src, dst).await?;
        self.delete(src).await
    }

    /// Delete an object. No-op when absent.
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Bulk cleanup of everything under `{prefix}/`, transparently
    /// paginated. Returns the number of objects removed.
    async fn delete_by_prefix(&self, prefix: &str) -> BlobResult<u64>;

    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Live object size, `None` when absent.
    async fn size(&self, key: &str) -> BlobResult<Option<i64>>;

    /// Rewrite descriptive metadata on an existing object. No-op when
    /// absent.
    async fn stamp(&self, key: &str, tags: &BlobTags) -> BlobResult<()>;

    /// Compare the live object's size against a declared size. Required
    /// because direct-to-storage uploads bypass the server entirely, so the
    /// declared size is only a claim until checked. `leeway` is a fixed
    /// byte tolerance.
    async fn validate(&self, key: &str, expected: i64, leeway: i64) -> BlobResult<SizeCheck> {
        match self.size(key).await? {
            None => Ok(SizeCheck::missing()),
            Some(actual) => Ok(SizeCheck {
                ok: (expected - leeway..=expected + leeway).contains(&actual),
                actual: Some(actual),
            }),
        }
    }

    /// Which backend tag this store answers to.
    fn kind(&self) -> BlobBackend;
}
