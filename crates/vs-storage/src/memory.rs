//! In-memory backend for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use vs_core::BlobBackend;

use crate::backend::{BlobResult, BlobStore, BlobTags};

/// HashMap-backed store. Records tags so re-stamping is observable.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, (Bytes, BlobTags)>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Tags currently stamped on an object.
    pub async fn tags(&self, key: &str) -> Option<BlobTags> {
        let objects = self.objects.read().await;
        objects.get(key).map(|(_, tags)| tags.clone())
    }

    /// All keys, sorted. Handy for asserting on storage state.
    pub async fn keys(&self) -> Vec<String> {
        let objects = self.objects.read().await;
        let mut keys: Vec<String> = objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn prefix_pattern(prefix: &str) -> String {
        format!("{}/", prefix.trim_end_matches('/'))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write_new(&self, key: &str, data: Bytes, tags: &BlobTags) -> BlobResult<()> {
        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), (data, tags.clone()));
        Ok(())
    }

    async fn upload_url(&self, key: &str, _ttl: Duration) -> BlobResult<String> {
        Ok(format!("/memory/{}", key))
    }

    async fn download_url(&self, key: &str, _ttl: Duration) -> BlobResult<String> {
        Ok(format!("/memory/{}", key))
    }

    async fn copy(&self, src: &str, dst: &str) -> BlobResult<()> {
        let mut objects = self.objects.write().await;
        if let Some(entry) = objects.get(src).cloned() {
            objects.insert(dst.to_string(), entry);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> BlobResult<u64> {
        let pattern = Self::prefix_pattern(prefix);
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&pattern));
        Ok((before - objects.len()) as u64)
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        let objects = self.objects.read().await;
        Ok(objects.contains_key(key))
    }

    async fn size(&self, key: &str) -> BlobResult<Option<i64>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(data, _)| data.len() as i64))
    }

    async fn stamp(&self, key: &str, tags: &BlobTags) -> BlobResult<()> {
        let mut objects = self.objects.write().await;
        if let Some(entry) = objects.get_mut(key) {
            entry.1 = tags.clone();
        }
        Ok(())
    }

    fn kind(&self) -> BlobBackend {
        BlobBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SizeCheck;

    #[tokio::test]
    async fn test_write_copy_delete() {
        let store = MemoryBlobStore::new();
        store
            .write_new("a/1", Bytes::from("data"), &BlobTags::empty())
            .await
            .unwrap();
        store.copy("a/1", "b/1").await.unwrap();
        assert!(store.exists("b/1").await.unwrap());

        // copy from a missing source is a no-op
        store.copy("a/missing", "b/2").await.unwrap();
        assert!(!store.exists("b/2").await.unwrap());

        store.delete("a/1").await.unwrap();
        store.delete("a/1").await.unwrap();
        assert!(!store.exists("a/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_is_segment_aligned() {
        let store = MemoryBlobStore::new();
        for key in ["abc/1", "abc/2", "abcd/1"] {
            store
                .write_new(key, Bytes::from("x"), &BlobTags::empty())
                .await
                .unwrap();
        }
        assert_eq!(store.delete_by_prefix("abc").await.unwrap(), 2);
        assert_eq!(store.keys().await, vec!["abcd/1".to_string()]);
    }

    #[tokio::test]
    async fn test_validate_tolerance() {
        let store = MemoryBlobStore::new();
        store
            .write_new("k", Bytes::from(vec![0u8; 1000]), &BlobTags::empty())
            .await
            .unwrap();

        for expected in [995, 1000, 1005] {
            let check = store.validate("k", expected, 5).await.unwrap();
            assert_eq!(
                check,
                SizeCheck { ok: true, actual: Some(1000) },
                "expected {}",
                expected
            );
        }
        for expected in [994, 1006] {
            let check = store.validate("k", expected, 5).await.unwrap();
            assert_eq!(
                check,
                SizeCheck { ok: false, actual: Some(1000) },
                "expected {}",
                expected
            );
        }

        assert_eq!(
            store.validate("missing", 1000, 5).await.unwrap(),
            SizeCheck::missing()
        );
    }

    #[tokio::test]
    async fn test_stamp_rewrites_tags() {
        let store = MemoryBlobStore::new();
        store
            .write_new("k", Bytes::from("x"), &BlobTags::empty())
            .await
            .unwrap();
        let tags = BlobTags::empty().file_name("2.name").owner("user:u1");
        store.stamp("k", &tags).await.unwrap();
        assert_eq!(store.tags("k").await, Some(tags));

        // stamping a missing object is a no-op
        store.stamp("missing", &BlobTags::empty()).await.unwrap();
        assert_eq!(store.tags("missing").await, None);
    }
}
