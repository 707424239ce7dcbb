//! Persistence and collaboration seams for the attachment service.
//!
//! Row storage, organization lookups, edit authorization, and change
//! notification all live behind traits so the service can be exercised
//! entirely in memory.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use vs_core::{AttachmentId, CipherId, OrgId, UserId};
use vs_models::{AttachmentMetadata, Cipher};

use crate::service::{AttachmentError, AttachmentResult};

/// Cipher row storage.
#[async_trait]
pub trait CipherStore: Send + Sync {
    async fn get(&self, id: CipherId) -> AttachmentResult<Option<Cipher>>;

    /// Persist the full cipher row, overwriting any previous state.
    async fn replace(&self, cipher: &Cipher) -> AttachmentResult<()>;

    /// Persist the row together with its collection memberships. Used by
    /// the share path, where both must land in one round trip.
    async fn replace_with_collections(
        &self,
        cipher: &Cipher,
        collection_ids: &[Uuid],
    ) -> AttachmentResult<()>;

    /// Insert or update a single attachment row.
    async fn upsert_attachment(
        &self,
        cipher_id: CipherId,
        attachment_id: AttachmentId,
        metadata: &AttachmentMetadata,
    ) -> AttachmentResult<()>;

    /// Remove a single attachment row. Absent rows are a no-op.
    async fn delete_attachment(
        &self,
        cipher_id: CipherId,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<()>;
}

/// Organization lookups the share path depends on.
#[async_trait]
pub trait OrgStore: Send + Sync {
    /// Whether the organization's plan allows attachments at all.
    async fn attachments_enabled(&self, organization_id: OrgId) -> AttachmentResult<bool>;
}

/// Edit authorization for a cipher. The real implementation consults
/// collection ACLs; this subsystem only asks the question.
#[async_trait]
pub trait EditGate: Send + Sync {
    async fn can_edit(&self, cipher: &Cipher, user_id: UserId) -> bool;
}

/// Gate that grants everything. For deployments where authorization is
/// enforced upstream, and for tests.
pub struct AllowAll;

#[async_trait]
impl EditGate for AllowAll {
    async fn can_edit(&self, _cipher: &Cipher, _user_id: UserId) -> bool {
        true
    }
}

/// Push notification hook, fired after a cipher mutation commits.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn cipher_updated(&self, cipher: &Cipher);
}

/// Notifier that drops every event.
pub struct NullNotifier;

#[async_trait]
impl ChangeNotifier for NullNotifier {
    async fn cipher_updated(&self, _cipher: &Cipher) {}
}

/// In-memory cipher store for tests.
pub struct MemoryCipherStore {
    ciphers: RwLock<HashMap<CipherId, Cipher>>,
    collections: RwLock<HashMap<CipherId, Vec<Uuid>>>,
}

impl Default for MemoryCipherStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCipherStore {
    pub fn new() -> Self {
        Self {
            ciphers: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a cipher row.
    pub async fn insert(&self, cipher: Cipher) {
        let mut ciphers = self.ciphers.write().await;
        ciphers.insert(cipher.id, cipher);
    }

    /// Collection memberships recorded by `replace_with_collections`.
    pub async fn collections(&self, cipher_id: CipherId) -> Vec<Uuid> {
        let collections = self.collections.read().await;
        collections.get(&cipher_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CipherStore for MemoryCipherStore {
    async fn get(&self, id: CipherId) -> AttachmentResult<Option<Cipher>> {
        let ciphers = self.ciphers.read().await;
        Ok(ciphers.get(&id).cloned())
    }

    async fn replace(&self, cipher: &Cipher) -> AttachmentResult<()> {
        let mut ciphers = self.ciphers.write().await;
        ciphers.insert(cipher.id, cipher.clone());
        Ok(())
    }

    async fn replace_with_collections(
        &self,
        cipher: &Cipher,
        collection_ids: &[Uuid],
    ) -> AttachmentResult<()> {
        self.replace(cipher).await?;
        let mut collections = self.collections.write().await;
        collections.insert(cipher.id, collection_ids.to_vec());
        Ok(())
    }

    async fn upsert_attachment(
        &self,
        cipher_id: CipherId,
        attachment_id: AttachmentId,
        metadata: &AttachmentMetadata,
    ) -> AttachmentResult<()> {
        let mut ciphers = self.ciphers.write().await;
        let cipher = ciphers
            .get_mut(&cipher_id)
            .ok_or_else(|| AttachmentError::not_found("cipher", cipher_id))?;
        cipher.add_attachment(attachment_id, metadata.clone());
        Ok(())
    }

    async fn delete_attachment(
        &self,
        cipher_id: CipherId,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<()> {
        let mut ciphers = self.ciphers.write().await;
        if let Some(cipher) = ciphers.get_mut(&cipher_id) {
            cipher.remove_attachment(&attachment_id);
        }
        Ok(())
    }
}

/// In-memory organization store for tests.
pub struct MemoryOrgStore {
    enabled: RwLock<HashSet<OrgId>>,
}

impl Default for MemoryOrgStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrgStore {
    pub fn new() -> Self {
        Self {
            enabled: RwLock::new(HashSet::new()),
        }
    }

    pub async fn enable_attachments(&self, organization_id: OrgId) {
        let mut enabled = self.enabled.write().await;
        enabled.insert(organization_id);
    }
}

#[async_trait]
impl OrgStore for MemoryOrgStore {
    async fn attachments_enabled(&self, organization_id: OrgId) -> AttachmentResult<bool> {
        let enabled = self.enabled.read().await;
        Ok(enabled.contains(&organization_id))
    }
}
