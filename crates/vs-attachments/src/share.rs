//! The share saga: move a personal cipher and its attachment blobs into
//! organizational custody.
//!
//! Ownership flips first, blobs follow, one attachment at a time through
//! the staging area. Any failure rolls the whole operation back
//! best-effort and re-raises the original error. Blob steps are no-ops
//! when their source is already gone, which is what makes the rollback
//! and retries safe.

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vs_core::{AttachmentId, CipherId, OrgId, OwnerId, UserId};
use vs_models::Cipher;
use vs_quota::QuotaLedger;
use vs_storage::{key, BlobStore};

use crate::service::{AttachmentError, AttachmentResult, AttachmentService};
use crate::store::CipherStore;

/// What became of a staging cleanup. Cleanup is best-effort; a failure is
/// an outcome the caller can observe, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// This many staged objects were removed.
    Cleaned(u64),
    /// The sweep failed; staged objects may remain until the next pass.
    OrphanPossible,
}

/// How far the saga got, for the rollback to undo exactly that much.
#[derive(Default)]
struct ShareProgress {
    ownership_committed: bool,
    attachments_migrated: bool,
    charged_org: i64,
    refunded_user: i64,
}

impl<C, B, L> AttachmentService<C, B, L>
where
    C: CipherStore,
    B: BlobStore,
    L: QuotaLedger,
{
    /// Share a personal cipher into an organization.
    ///
    /// Preconditions are checked before any side effect: the cipher must be
    /// in personal custody of `sharing_user`, the organization must allow
    /// attachments, and the organization's quota must fit the cipher's
    /// committed attachment bytes.
    #[instrument(
        skip_all,
        fields(cipher_id = %cipher_id, organization_id = %organization_id)
    )]
    pub async fn share(
        &self,
        cipher_id: CipherId,
        organization_id: OrgId,
        collection_ids: &[Uuid],
        sharing_user: UserId,
    ) -> AttachmentResult<Cipher> {
        let cipher = self
            .ciphers()
            .get(cipher_id)
            .await?
            .ok_or_else(|| AttachmentError::not_found("cipher", cipher_id))?;

        if cipher.has_organization() {
            return Err(AttachmentError::Validation(
                "cipher already belongs to an organization".to_string(),
            ));
        }
        if cipher.user_id != Some(sharing_user) {
            return Err(AttachmentError::Permission(format!(
                "user {} is not the owner of cipher {}",
                sharing_user, cipher_id
            )));
        }
        if !self.orgs().attachments_enabled(organization_id).await? {
            return Err(AttachmentError::Validation(
                "organization does not allow attachments".to_string(),
            ));
        }
        let total = cipher.attachment_total_bytes();
        if total > 0 {
            self.ledger()
                .check(OwnerId::Organization(organization_id), total)
                .await?;
        }

        let snapshot = cipher.clone();
        let mut shared = cipher;
        // personal owner retained transiently so collection scoping still
        // sees it; cleared once the blobs have moved
        shared.organization_id = Some(organization_id);
        shared.updated_at = Utc::now();

        let mut progress = ShareProgress::default();
        let outcome = self
            .run_share(
                &mut shared,
                organization_id,
                collection_ids,
                sharing_user,
                &mut progress,
            )
            .await;

        match outcome {
            Ok(()) => {
                self.cleanup_staged(cipher_id).await;
                self.notifier().cipher_updated(&shared).await;
                info!(bytes = total, "cipher shared");
                Ok(shared)
            }
            Err(original) => {
                self.rollback_share(&snapshot, organization_id, sharing_user, &progress)
                    .await;
                self.cleanup_staged(cipher_id).await;
                // the original failure reaches the caller unmasked
                Err(original)
            }
        }
    }

    async fn run_share(
        &self,
        shared: &mut Cipher,
        organization_id: OrgId,
        collection_ids: &[Uuid],
        sharing_user: UserId,
        progress: &mut ShareProgress,
    ) -> AttachmentResult<()> {
        // phase one: ownership
        self.ciphers()
            .replace_with_collections(shared, collection_ids)
            .await?;
        progress.ownership_committed = true;

        // phase two: blobs, strictly sequential so the failure point stays
        // well-defined
        let mut attachment_ids: Vec<AttachmentId> = shared.attachments.keys().copied().collect();
        attachment_ids.sort();

        for attachment_id in attachment_ids {
            let size = shared.attachments[&attachment_id].size;
            self.migrate_attachment(shared.id, organization_id, attachment_id)
                .await?;
            progress.attachments_migrated = true;

            self.ledger()
                .apply(OwnerId::Organization(organization_id), size)
                .await?;
            progress.charged_org += size;
            self.ledger()
                .apply(OwnerId::User(sharing_user), -size)
                .await?;
            progress.refunded_user += size;
        }

        // custody fully organizational now
        shared.user_id = None;
        shared.updated_at = Utc::now();
        self.ciphers().replace(shared).await?;
        Ok(())
    }

    /// Move one blob from its personal key to its organizational key via
    /// the staging area, keeping a staged backup of the personal object for
    /// the rollback.
    async fn migrate_attachment(
        &self,
        cipher_id: CipherId,
        organization_id: OrgId,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<()> {
        let personal = key::attachment_key(cipher_id, attachment_id, None, false);
        let staged = key::attachment_key(cipher_id, attachment_id, Some(organization_id), true);
        let backup = key::attachment_key(cipher_id, attachment_id, None, true);
        let org = key::attachment_key(cipher_id, attachment_id, Some(organization_id), false);

        self.blobs().copy(&personal, &staged).await?;
        self.blobs().copy(&personal, &backup).await?;
        self.blobs().rename(&staged, &org).await?;
        self.blobs().delete(&personal).await?;
        Ok(())
    }

    /// Best-effort compensation. Failures in here are logged, never
    /// raised, so the original error is the one the caller sees.
    async fn rollback_share(
        &self,
        snapshot: &Cipher,
        organization_id: OrgId,
        sharing_user: UserId,
        progress: &ShareProgress,
    ) {
        if !progress.ownership_committed {
            return;
        }

        if let Err(err) = self.ciphers().replace(snapshot).await {
            warn!(
                cipher_id = %snapshot.id,
                error = %err,
                "could not restore cipher ownership during rollback"
            );
        }

        if !progress.attachments_migrated {
            return;
        }

        if progress.charged_org > 0 {
            if let Err(err) = self
                .ledger()
                .apply(OwnerId::Organization(organization_id), -progress.charged_org)
                .await
            {
                warn!(
                    organization_id = %organization_id,
                    error = %err,
                    "could not reverse organization ledger charge"
                );
            }
        }
        if progress.refunded_user > 0 {
            if let Err(err) = self
                .ledger()
                .apply(OwnerId::User(sharing_user), progress.refunded_user)
                .await
            {
                warn!(
                    user_id = %sharing_user,
                    error = %err,
                    "could not reinstate user ledger charge"
                );
            }
        }

        // every attachment, not only the migrated ones; for the untouched
        // ones this reduces to no-ops
        for attachment_id in snapshot.attachments.keys().copied() {
            if let Err(err) = self
                .rollback_attachment(snapshot.id, organization_id, attachment_id)
                .await
            {
                warn!(
                    cipher_id = %snapshot.id,
                    attachment_id = %attachment_id,
                    error = %err,
                    "attachment rollback failed, orphan possible"
                );
            }
        }
    }

    /// Put one blob back under its personal key and drop the
    /// organizational copies. Safe to repeat.
    async fn rollback_attachment(
        &self,
        cipher_id: CipherId,
        organization_id: OrgId,
        attachment_id: AttachmentId,
    ) -> AttachmentResult<()> {
        let personal = key::attachment_key(cipher_id, attachment_id, None, false);
        let backup = key::attachment_key(cipher_id, attachment_id, None, true);
        let staged = key::attachment_key(cipher_id, attachment_id, Some(organization_id), true);
        let org = key::attachment_key(cipher_id, attachment_id, Some(organization_id), false);

        if !self.blobs().exists(&personal).await? {
            self.blobs().copy(&backup, &personal).await?;
        }
        self.blobs().delete(&org).await?;
        self.blobs().delete(&staged).await?;
        Ok(())
    }

    /// Sweep everything under the cipher's staging prefix.
    pub async fn cleanup_staged(&self, cipher_id: CipherId) -> CleanupOutcome {
        match self
            .blobs()
            .delete_by_prefix(&key::staging_prefix(cipher_id))
            .await
        {
            Ok(count) => {
                if count > 0 {
                    info!(cipher_id = %cipher_id, count, "staging area cleaned");
                }
                CleanupOutcome::Cleaned(count)
            }
            Err(err) => {
                warn!(
                    cipher_id = %cipher_id,
                    error = %err,
                    "staging cleanup failed, orphans possible"
                );
                CleanupOutcome::OrphanPossible
            }
        }
    }
}
