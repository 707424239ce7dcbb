//! Attachment lifecycle: create, delete, verify, grants, purge.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vs_core::{AttachmentId, StorageSettings, UserId};
use vs_models::{AttachmentMetadata, Cipher};
use vs_quota::{QuotaError, QuotaLedger};
use vs_storage::{key, BlobError, BlobStore, BlobTags, SizeCheck};

use crate::store::{ChangeNotifier, CipherStore, EditGate, OrgStore};

/// Attachment service errors
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Storage(#[from] BlobError),
    #[error("Store error: {0}")]
    Store(String),
}

impl AttachmentError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Orchestrates attachment blobs, rows, and quota as one unit.
///
/// The blob store, row store, and ledger are separate systems with no shared
/// transaction; ordering and compensation keep them consistent. The rule
/// throughout: metadata and ledger first, blobs best-effort last, so a
/// failure can only ever leave an unreferenced blob, never a dangling row.
pub struct AttachmentService<C, B, L>
where
    C: CipherStore,
    B: BlobStore,
    L: QuotaLedger,
{
    ciphers: Arc<C>,
    blobs: Arc<B>,
    ledger: Arc<L>,
    orgs: Arc<dyn OrgStore>,
    gate: Arc<dyn EditGate>,
    notifier: Arc<dyn ChangeNotifier>,
    settings: StorageSettings,
}

impl<C, B, L> AttachmentService<C, B, L>
where
    C: CipherStore,
    B: BlobStore,
    L: QuotaLedger,
{
    pub fn new(
        ciphers: Arc<C>,
        blobs: Arc<B>,
        ledger: Arc<L>,
        orgs: Arc<dyn OrgStore>,
        gate: Arc<dyn EditGate>,
        notifier: Arc<dyn ChangeNotifier>,
        settings: StorageSettings,
    ) -> Self {
        Self {
            ciphers,
            blobs,
            ledger,
            orgs,
            gate,
            notifier,
            settings,
        }
    }

    pub(crate) fn ciphers(&self) -> &C {
        &self.ciphers
    }

    pub(crate) fn blobs(&self) -> &B {
        &self.blobs
    }

    pub(crate) fn ledger(&self) -> &L {
        &self.ledger
    }

    pub(crate) fn orgs(&self) -> &dyn OrgStore {
        self.orgs.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn ChangeNotifier {
        self.notifier.as_ref()
    }

    async fn ensure_can_edit(&self, cipher: &Cipher, user_id: UserId) -> AttachmentResult<()> {
        if self.gate.can_edit(cipher, user_id).await {
            Ok(())
        } else {
            Err(AttachmentError::Permission(format!(
                "user {} cannot edit cipher {}",
                user_id, cipher.id
            )))
        }
    }

    /// Create an attachment from server-held bytes.
    ///
    /// Quota is checked before the blob write; the metadata row and ledger
    /// charge land only after the write succeeds. If persisting fails the
    /// blob is deleted again so no unreferenced object outlives the call.
    #[instrument(skip(self, cipher, data), fields(cipher_id = %cipher.id))]
    pub async fn create(
        &self,
        cipher: &mut Cipher,
        data: Bytes,
        file_name: &str,
        declared_size: i64,
        saving_user: UserId,
    ) -> AttachmentResult<AttachmentId> {
        self.ensure_can_edit(cipher, saving_user).await?;
        if declared_size <= 0 {
            return Err(AttachmentError::Validation(
                "attachment size must be positive".to_string(),
            ));
        }
        let owner = cipher.owner();
        // the declared size drives the quota check; the payload comparison
        // comes after so an oversized claim fails as a quota error
        self.ledger.check(owner, declared_size).await?;

        if declared_size != data.len() as i64 {
            return Err(AttachmentError::Validation(format!(
                "declared size {} does not match payload of {} bytes",
                declared_size,
                data.len()
            )));
        }

        let attachment_id = Uuid::new_v4();
        let blob_key = key::attachment_key(cipher.id, attachment_id, cipher.organization_id, false);
        let tags = BlobTags::empty()
            .file_name(file_name)
            .owner(owner.to_string());
        self.blobs.write_new(&blob_key, data, &tags).await?;

        let metadata = AttachmentMetadata::new(file_name, declared_size, self.blobs.kind());
        if let Err(err) = self
            .commit_attachment(cipher, attachment_id, &metadata)
            .await
        {
            if let Err(cleanup) = self.blobs.delete(&blob_key).await {
                warn!(key = %blob_key, error = %cleanup, "orphan blob left after failed create");
            }
            return Err(err);
        }

        cipher.add_attachment(attachment_id, metadata.clone());
        self.notifier.cipher_updated(cipher).await;
        info!(
            attachment_id = %attachment_id,
            size = %metadata.human_size(),
            "attachment created"
        );
        Ok(attachment_id)
    }

    /// Row first, then the ledger charge. If the charge fails the row is
    /// taken back so the ledger never exceeds committed rows.
    async fn commit_attachment(
        &self,
        cipher: &Cipher,
        attachment_id: AttachmentId,
        metadata: &AttachmentMetadata,
    ) -> AttachmentResult<()> {
        self.ciphers
            .upsert_attachment(cipher.id, attachment_id, metadata)
            .await?;
        if let Err(err) = self.ledger.apply(cipher.owner(), metadata.size).await {
            if let Err(undo) = self.ciphers.delete_attachment(cipher.id, attachment_id).await {
                warn!(
                    attachment_id = %attachment_id,
                    error = %undo,
                    "could not take back attachment row after ledger failure"
                );
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Delete an attachment.
    ///
    /// The row and the ledger refund commit before the blob delete; a blob
    /// delete failure is logged, not raised, since the attachment is already
    /// gone from the caller's point of view.
    #[instrument(skip(self, cipher), fields(cipher_id = %cipher.id))]
    pub async fn delete(
        &self,
        cipher: &mut Cipher,
        attachment_id: AttachmentId,
        deleting_user: UserId,
    ) -> AttachmentResult<()> {
        self.ensure_can_edit(cipher, deleting_user).await?;
        let metadata = cipher
            .attachments
            .get(&attachment_id)
            .cloned()
            .ok_or_else(|| AttachmentError::not_found("attachment", attachment_id))?;

        self.ciphers
            .delete_attachment(cipher.id, attachment_id)
            .await?;
        // the row delete already committed; the refund and the blob delete
        // are best-effort from here
        if let Err(err) = self.ledger.apply(cipher.owner(), -metadata.size).await {
            warn!(
                attachment_id = %attachment_id,
                bytes = metadata.size,
                error = %err,
                "ledger refund failed after row delete"
            );
        }
        cipher.remove_attachment(&attachment_id);

        let blob_key = key::attachment_key(cipher.id, attachment_id, cipher.organization_id, false);
        if let Err(err) = self.blobs.delete(&blob_key).await {
            warn!(key = %blob_key, error = %err, "blob delete failed, orphan possible");
        }

        self.notifier.cipher_updated(cipher).await;
        info!(attachment_id = %attachment_id, "attachment deleted");
        Ok(())
    }

    /// Time-limited download grant for an existing attachment.
    pub async fn download_url(
        &self,
        cipher: &Cipher,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<String> {
        if !cipher.attachments.contains_key(&attachment_id) {
            return Err(AttachmentError::not_found("attachment", attachment_id));
        }
        let blob_key = key::attachment_key(cipher.id, attachment_id, cipher.organization_id, false);
        Ok(self
            .blobs
            .download_url(&blob_key, self.settings.url_ttl())
            .await?)
    }

    /// Time-limited upload grant for an attachment whose metadata already
    /// exists. The client uploads directly to storage, then the caller
    /// confirms with [`verify_upload`](Self::verify_upload).
    pub async fn upload_url(
        &self,
        cipher: &Cipher,
        attachment_id: AttachmentId,
        uploading_user: UserId,
    ) -> AttachmentResult<String> {
        self.ensure_can_edit(cipher, uploading_user).await?;
        if !cipher.attachments.contains_key(&attachment_id) {
            return Err(AttachmentError::not_found("attachment", attachment_id));
        }
        let blob_key = key::attachment_key(cipher.id, attachment_id, cipher.organization_id, false);
        Ok(self
            .blobs
            .upload_url(&blob_key, self.settings.url_ttl())
            .await?)
    }

    /// Confirm a client-direct upload against the declared size.
    ///
    /// The declared size is only a claim until the stored object is
    /// measured. On a mismatch or a missing object the claim is withdrawn:
    /// row removed, ledger refunded, blob deleted best-effort. The result is
    /// returned as data either way.
    #[instrument(skip(self, cipher), fields(cipher_id = %cipher.id))]
    pub async fn verify_upload(
        &self,
        cipher: &mut Cipher,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<SizeCheck> {
        let metadata = cipher
            .attachments
            .get(&attachment_id)
            .cloned()
            .ok_or_else(|| AttachmentError::not_found("attachment", attachment_id))?;

        let blob_key = key::attachment_key(cipher.id, attachment_id, cipher.organization_id, false);
        let check = self
            .blobs
            .validate(&blob_key, metadata.size, self.settings.size_leeway_bytes)
            .await?;

        if check.ok {
            // The client wrote the object directly, so the descriptive
            // metadata is missing until we stamp it.
            let tags = BlobTags::empty()
                .file_name(metadata.file_name.as_str())
                .owner(cipher.owner().to_string());
            if let Err(err) = self.blobs.stamp(&blob_key, &tags).await {
                warn!(key = %blob_key, error = %err, "could not stamp uploaded blob");
            }
            info!(attachment_id = %attachment_id, "upload verified");
        } else {
            self.ciphers
                .delete_attachment(cipher.id, attachment_id)
                .await?;
            if let Err(err) = self.ledger.apply(cipher.owner(), -metadata.size).await {
                warn!(
                    attachment_id = %attachment_id,
                    bytes = metadata.size,
                    error = %err,
                    "ledger refund failed after withdrawing the claim"
                );
            }
            cipher.remove_attachment(&attachment_id);
            if let Err(err) = self.blobs.delete(&blob_key).await {
                warn!(key = %blob_key, error = %err, "blob delete failed, orphan possible");
            }
            warn!(
                attachment_id = %attachment_id,
                declared = metadata.size,
                actual = ?check.actual,
                "upload verification failed, claim withdrawn"
            );
        }
        Ok(check)
    }

    /// Release everything a cipher holds in storage: the ledger refund for
    /// its committed bytes, then best-effort blob cleanup for both the
    /// committed prefix and any staging leftovers. The cipher row itself is
    /// the caller's to delete.
    #[instrument(skip(self, cipher), fields(cipher_id = %cipher.id))]
    pub async fn purge(&self, cipher: &Cipher) -> AttachmentResult<()> {
        let total = cipher.attachment_total_bytes();
        if total > 0 {
            self.ledger.apply(cipher.owner(), -total).await?;
        }
        if let Err(err) = self
            .blobs
            .delete_by_prefix(&key::cipher_prefix(cipher.id))
            .await
        {
            warn!(cipher_id = %cipher.id, error = %err, "blob purge failed, orphans possible");
        }
        self.cleanup_staged(cipher.id).await;
        info!(bytes = total, "cipher storage purged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vs_core::OwnerId;
    use vs_models::StorageQuota;
    use vs_quota::MemoryQuotaLedger;
    use vs_storage::MemoryBlobStore;

    use crate::store::{AllowAll, MemoryCipherStore, MemoryOrgStore, NullNotifier};

    const MB: i64 = 1024 * 1024;

    struct Fixture {
        service: AttachmentService<MemoryCipherStore, MemoryBlobStore, MemoryQuotaLedger>,
        ciphers: Arc<MemoryCipherStore>,
        blobs: Arc<MemoryBlobStore>,
        ledger: Arc<MemoryQuotaLedger>,
    }

    async fn fixture() -> Fixture {
        let ciphers = Arc::new(MemoryCipherStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = Arc::new(MemoryQuotaLedger::new());
        let service = AttachmentService::new(
            Arc::clone(&ciphers),
            Arc::clone(&blobs),
            Arc::clone(&ledger),
            Arc::new(MemoryOrgStore::new()),
            Arc::new(AllowAll),
            Arc::new(NullNotifier),
            StorageSettings::default(),
        );
        Fixture {
            service,
            ciphers,
            blobs,
            ledger,
        }
    }

    async fn seeded_cipher(fx: &Fixture, quota: StorageQuota) -> (Cipher, UserId) {
        let user = Uuid::new_v4();
        let cipher = Cipher::personal(Uuid::new_v4(), user, "2.ciphertext");
        fx.ciphers.insert(cipher.clone()).await;
        fx.ledger.set_quota(OwnerId::User(user), quota).await;
        (cipher, user)
    }

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[tokio::test]
    async fn test_create_commits_blob_row_and_ledger() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;

        let id = fx
            .service
            .create(&mut cipher, payload(512), "2.encname", 512, user)
            .await
            .unwrap();

        let blob_key = key::attachment_key(cipher.id, id, None, false);
        assert!(fx.blobs.exists(&blob_key).await.unwrap());
        assert_eq!(
            fx.ledger.consumed(OwnerId::User(user)).await.unwrap(),
            512
        );

        let stored = fx.ciphers.get(cipher.id).await.unwrap().unwrap();
        assert_eq!(stored.attachments.get(&id).map(|m| m.size), Some(512));
        assert_eq!(stored.attachment_total_bytes(), 512);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_sizes() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(MB)).await;

        let err = fx
            .service
            .create(&mut cipher, payload(0), "2.encname", 0, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Validation(_)));

        let err = fx
            .service
            .create(&mut cipher, payload(10), "2.encname", 20, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Validation(_)));
        assert!(fx.blobs.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_over_quota_leaves_no_trace() {
        // 100 MB quota, 150 MB upload: rejected before any write.
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;

        let err = fx
            .service
            .create(&mut cipher, payload(150), "2.encname", 150 * MB, user)
            .await
            .unwrap_err();
        // declared size drives the check, so it fires before the payload
        // length comparison could
        assert!(matches!(
            err,
            AttachmentError::Quota(QuotaError::Exceeded { .. })
        ));
        assert!(fx.blobs.keys().await.is_empty());
        assert_eq!(fx.ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
        let stored = fx.ciphers.get(cipher.id).await.unwrap().unwrap();
        assert!(stored.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_create_respects_disabled_quota() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Disabled).await;
        let err = fx
            .service
            .create(&mut cipher, payload(1), "2.encname", 1, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Quota(_)));
    }

    /// Cipher store whose attachment upsert always fails.
    struct BrokenUpserts {
        inner: MemoryCipherStore,
    }

    #[async_trait]
    impl CipherStore for BrokenUpserts {
        async fn get(&self, id: vs_core::CipherId) -> AttachmentResult<Option<Cipher>> {
            self.inner.get(id).await
        }
        async fn replace(&self, cipher: &Cipher) -> AttachmentResult<()> {
            self.inner.replace(cipher).await
        }
        async fn replace_with_collections(
            &self,
            cipher: &Cipher,
            collection_ids: &[Uuid],
        ) -> AttachmentResult<()> {
            self.inner.replace_with_collections(cipher, collection_ids).await
        }
        async fn upsert_attachment(
            &self,
            _cipher_id: vs_core::CipherId,
            _attachment_id: AttachmentId,
            _metadata: &AttachmentMetadata,
        ) -> AttachmentResult<()> {
            Err(AttachmentError::Store("connection reset".to_string()))
        }
        async fn delete_attachment(
            &self,
            cipher_id: vs_core::CipherId,
            attachment_id: AttachmentId,
        ) -> AttachmentResult<()> {
            self.inner.delete_attachment(cipher_id, attachment_id).await
        }
    }

    #[tokio::test]
    async fn test_create_deletes_blob_when_row_persist_fails() {
        let ciphers = Arc::new(BrokenUpserts {
            inner: MemoryCipherStore::new(),
        });
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = Arc::new(MemoryQuotaLedger::new());
        let service = AttachmentService::new(
            Arc::clone(&ciphers),
            Arc::clone(&blobs),
            Arc::clone(&ledger),
            Arc::new(MemoryOrgStore::new()),
            Arc::new(AllowAll),
            Arc::new(NullNotifier),
            StorageSettings::default(),
        );

        let user = Uuid::new_v4();
        let mut cipher = Cipher::personal(Uuid::new_v4(), user, "2.ciphertext");
        ciphers.inner.insert(cipher.clone()).await;
        ledger
            .set_quota(OwnerId::User(user), StorageQuota::Limited(MB))
            .await;

        let err = service
            .create(&mut cipher, payload(64), "2.encname", 64, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Store(_)));
        // compensation removed the blob and never charged the ledger
        assert!(blobs.keys().await.is_empty());
        assert_eq!(ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
        assert!(cipher.attachments.is_empty());
    }

    /// Gate that denies everything.
    struct DenyAll;

    #[async_trait]
    impl EditGate for DenyAll {
        async fn can_edit(&self, _cipher: &Cipher, _user_id: UserId) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_permission_gate_blocks_mutations() {
        let ciphers = Arc::new(MemoryCipherStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = Arc::new(MemoryQuotaLedger::new());
        let service = AttachmentService::new(
            Arc::clone(&ciphers),
            blobs,
            ledger,
            Arc::new(MemoryOrgStore::new()),
            Arc::new(DenyAll),
            Arc::new(NullNotifier),
            StorageSettings::default(),
        );

        let user = Uuid::new_v4();
        let mut cipher = Cipher::personal(Uuid::new_v4(), user, "2.ciphertext");
        let err = service
            .create(&mut cipher, payload(8), "2.encname", 8, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Permission(_)));

        let err = service
            .delete(&mut cipher, Uuid::new_v4(), user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Permission(_)));
    }

    #[tokio::test]
    async fn test_delete_refunds_ledger_and_removes_blob() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(MB)).await;
        let id = fx
            .service
            .create(&mut cipher, payload(256), "2.encname", 256, user)
            .await
            .unwrap();

        fx.service.delete(&mut cipher, id, user).await.unwrap();

        assert!(fx.blobs.keys().await.is_empty());
        assert_eq!(fx.ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
        let stored = fx.ciphers.get(cipher.id).await.unwrap().unwrap();
        assert!(stored.attachments.is_empty());
    }

    /// Ledger that accepts charges but fails every refund.
    struct RefundFailingLedger {
        inner: MemoryQuotaLedger,
    }

    #[async_trait]
    impl QuotaLedger for RefundFailingLedger {
        async fn quota(&self, owner: OwnerId) -> vs_quota::QuotaResult<StorageQuota> {
            self.inner.quota(owner).await
        }
        async fn consumed(&self, owner: OwnerId) -> vs_quota::QuotaResult<i64> {
            self.inner.consumed(owner).await
        }
        async fn apply(&self, owner: OwnerId, delta: i64) -> vs_quota::QuotaResult<i64> {
            if delta < 0 {
                return Err(QuotaError::Ledger("connection reset".to_string()));
            }
            self.inner.apply(owner, delta).await
        }
    }

    #[tokio::test]
    async fn test_delete_survives_a_failing_refund() {
        let ciphers = Arc::new(MemoryCipherStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let ledger = Arc::new(RefundFailingLedger {
            inner: MemoryQuotaLedger::new(),
        });
        let service = AttachmentService::new(
            Arc::clone(&ciphers),
            Arc::clone(&blobs),
            Arc::clone(&ledger),
            Arc::new(MemoryOrgStore::new()),
            Arc::new(AllowAll),
            Arc::new(NullNotifier),
            StorageSettings::default(),
        );

        let user = Uuid::new_v4();
        let mut cipher = Cipher::personal(Uuid::new_v4(), user, "2.ciphertext");
        ciphers.insert(cipher.clone()).await;
        ledger
            .inner
            .set_quota(OwnerId::User(user), StorageQuota::Limited(MB))
            .await;
        let id = service
            .create(&mut cipher, payload(256), "2.encname", 256, user)
            .await
            .unwrap();

        // the delete still commits; only the refund is lost
        service.delete(&mut cipher, id, user).await.unwrap();
        assert!(blobs.keys().await.is_empty());
        let stored = ciphers.get(cipher.id).await.unwrap().unwrap();
        assert!(stored.attachments.is_empty());
        // the stale charge stays behind for a later reconciliation
        assert_eq!(
            ledger.inner.consumed(OwnerId::User(user)).await.unwrap(),
            256
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_attachment() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(MB)).await;
        let err = fx
            .service
            .delete(&mut cipher, Uuid::new_v4(), user)
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_grants_point_at_the_blob_key() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(MB)).await;
        let id = fx
            .service
            .create(&mut cipher, payload(16), "2.encname", 16, user)
            .await
            .unwrap();

        let blob_key = key::attachment_key(cipher.id, id, None, false);
        let down = fx.service.download_url(&cipher, id).await.unwrap();
        let up = fx.service.upload_url(&cipher, id, user).await.unwrap();
        assert!(down.contains(&blob_key));
        assert!(up.contains(&blob_key));

        let err = fx
            .service
            .download_url(&cipher, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_verify_upload_ok_stamps_tags() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;
        let id = fx
            .service
            .create(&mut cipher, payload(1000), "2.encname", 1000, user)
            .await
            .unwrap();

        let check = fx.service.verify_upload(&mut cipher, id).await.unwrap();
        assert!(check.ok);
        assert_eq!(check.actual, Some(1000));

        let blob_key = key::attachment_key(cipher.id, id, None, false);
        let tags = fx.blobs.tags(&blob_key).await.unwrap();
        assert_eq!(tags.file_name.as_deref(), Some("2.encname"));
        assert_eq!(tags.owner, Some(OwnerId::User(user).to_string()));
    }

    #[tokio::test]
    async fn test_verify_upload_mismatch_withdraws_claim() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;
        let id = fx
            .service
            .create(&mut cipher, payload(100), "2.encname", 100, user)
            .await
            .unwrap();

        // simulate a client that uploaded something far larger than declared
        let blob_key = key::attachment_key(cipher.id, id, None, false);
        fx.blobs
            .write_new(
                &blob_key,
                payload(100 + 2 * MB as usize),
                &BlobTags::empty(),
            )
            .await
            .unwrap();

        let check = fx.service.verify_upload(&mut cipher, id).await.unwrap();
        assert!(!check.ok);
        assert_eq!(check.actual, Some(100 + 2 * MB));

        // claim withdrawn everywhere
        assert!(cipher.attachments.is_empty());
        assert!(fx.blobs.keys().await.is_empty());
        assert_eq!(fx.ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
        let stored = fx.ciphers.get(cipher.id).await.unwrap().unwrap();
        assert!(stored.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_verify_upload_missing_blob() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;
        let id = fx
            .service
            .create(&mut cipher, payload(100), "2.encname", 100, user)
            .await
            .unwrap();
        let blob_key = key::attachment_key(cipher.id, id, None, false);
        fx.blobs.delete(&blob_key).await.unwrap();

        let check = fx.service.verify_upload(&mut cipher, id).await.unwrap();
        assert_eq!(check, SizeCheck::missing());
        assert!(cipher.attachments.is_empty());
        assert_eq!(fx.ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_releases_bytes_and_blobs() {
        let fx = fixture().await;
        let (mut cipher, user) = seeded_cipher(&fx, StorageQuota::Limited(100 * MB)).await;
        fx.service
            .create(&mut cipher, payload(100), "2.one", 100, user)
            .await
            .unwrap();
        fx.service
            .create(&mut cipher, payload(200), "2.two", 200, user)
            .await
            .unwrap();
        assert_eq!(
            fx.ledger.consumed(OwnerId::User(user)).await.unwrap(),
            300
        );

        fx.service.purge(&cipher).await.unwrap();

        assert!(fx.blobs.keys().await.is_empty());
        assert_eq!(fx.ledger.consumed(OwnerId::User(user)).await.unwrap(), 0);
    }
}
