//! Send file lifecycle: attach, verify, grants, release.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vs_core::{SendFileId, SendId, StorageSettings};
use vs_models::{Send, SendFile, SendType};
use vs_quota::{QuotaError, QuotaLedger};
use vs_storage::{key, BlobError, BlobStore, BlobTags, SizeCheck};

use crate::store::{SendNotifier, SendStore};

/// Send service errors
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Access denied: {0}")]
    Access(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    Storage(#[from] BlobError),
    #[error("Store error: {0}")]
    Store(String),
}

impl SendError {
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type SendResult<T> = Result<T, SendError>;

/// Orchestrates the single file a Send may carry.
///
/// Same consistency rule as attachments: metadata and ledger commit first,
/// blob operations run best-effort last, so a failure can only ever leave
/// an unreferenced blob behind.
pub struct SendFileService<S, B, L>
where
    S: SendStore,
    B: BlobStore,
    L: QuotaLedger,
{
    sends: Arc<S>,
    blobs: Arc<B>,
    ledger: Arc<L>,
    notifier: Arc<dyn SendNotifier>,
    settings: StorageSettings,
}

impl<S, B, L> SendFileService<S, B, L>
where
    S: SendStore,
    B: BlobStore,
    L: QuotaLedger,
{
    pub fn new(
        sends: Arc<S>,
        blobs: Arc<B>,
        ledger: Arc<L>,
        notifier: Arc<dyn SendNotifier>,
        settings: StorageSettings,
    ) -> Self {
        Self {
            sends,
            blobs,
            ledger,
            notifier,
            settings,
        }
    }

    /// Attach a file to a Send from server-held bytes.
    ///
    /// A Send carries at most one file, immutable once committed; a second
    /// attach is refused outright.
    #[instrument(skip(self, send, data), fields(send_id = %send.id))]
    pub async fn create_file(
        &self,
        send: &mut Send,
        data: Bytes,
        file_name: &str,
        declared_size: i64,
    ) -> SendResult<SendFileId> {
        if send.send_type != SendType::File {
            return Err(SendError::Validation(
                "only file sends can carry a file".to_string(),
            ));
        }
        if send.file.is_some() {
            return Err(SendError::Validation(
                "send already has a file".to_string(),
            ));
        }
        if declared_size <= 0 {
            return Err(SendError::Validation(
                "file size must be positive".to_string(),
            ));
        }

        let owner = send.owner();
        self.ledger.check(owner, declared_size).await?;

        if declared_size != data.len() as i64 {
            return Err(SendError::Validation(format!(
                "declared size {} does not match payload of {} bytes",
                declared_size,
                data.len()
            )));
        }

        let file_id = Uuid::new_v4();
        let blob_key = key::send_key(send.id, file_id);
        let tags = BlobTags::empty()
            .file_name(file_name)
            .owner(owner.to_string());
        self.blobs.write_new(&blob_key, data, &tags).await?;

        let file = SendFile {
            id: file_id,
            file_name: file_name.to_string(),
            size: declared_size,
        };
        if let Err(err) = self.commit_file(send, file).await {
            if let Err(cleanup) = self.blobs.delete(&blob_key).await {
                warn!(key = %blob_key, error = %cleanup, "orphan blob left after failed attach");
            }
            return Err(err);
        }

        self.notifier.send_updated(send).await;
        info!(file_id = %file_id, size = declared_size, "send file attached");
        Ok(file_id)
    }

    /// Row first, then the ledger charge; the row is put back on a ledger
    /// failure.
    async fn commit_file(&self, send: &mut Send, file: SendFile) -> SendResult<()> {
        let before = send.clone();
        let size = file.size;
        send.set_file(file);
        if let Err(err) = self.sends.replace(send).await {
            *send = before;
            return Err(err);
        }
        if let Err(err) = self.ledger.apply(send.owner(), size).await {
            if let Err(undo) = self.sends.replace(&before).await {
                warn!(send_id = %send.id, error = %undo, "could not restore send row after ledger failure");
            }
            *send = before;
            return Err(err.into());
        }
        Ok(())
    }

    /// Delete a Send and release its storage.
    ///
    /// The row and the ledger refund commit before the blob sweep; a sweep
    /// failure is logged, not raised.
    #[instrument(skip(self))]
    pub async fn delete(&self, send_id: SendId) -> SendResult<()> {
        let send = self
            .sends
            .get(send_id)
            .await?
            .ok_or_else(|| SendError::not_found("send", send_id))?;

        self.sends.delete(send_id).await?;
        // the row delete already committed; the refund and the blob sweep
        // are best-effort from here
        if let Some(file) = &send.file {
            if let Err(err) = self.ledger.apply(send.owner(), -file.size).await {
                warn!(
                    send_id = %send_id,
                    bytes = file.size,
                    error = %err,
                    "ledger refund failed after row delete"
                );
            }
        }
        if let Err(err) = self.blobs.delete_by_prefix(&key::send_prefix(send_id)).await {
            warn!(send_id = %send_id, error = %err, "blob sweep failed, orphan possible");
        }

        self.notifier.send_deleted(send_id).await;
        info!("send deleted");
        Ok(())
    }

    /// Time-limited download grant, gated on the send's stored access
    /// rules. Password verification and access counting stay with the
    /// caller.
    pub async fn download_url(&self, send: &Send) -> SendResult<String> {
        let file = send
            .file
            .as_ref()
            .ok_or_else(|| SendError::not_found("send file", send.id))?;
        if !send.access_allowed(Utc::now()) {
            return Err(SendError::Access(
                "send is disabled, expired, or out of accesses".to_string(),
            ));
        }
        let blob_key = key::send_key(send.id, file.id);
        Ok(self
            .blobs
            .download_url(&blob_key, self.settings.url_ttl())
            .await?)
    }

    /// Time-limited upload grant for a file whose claim already exists.
    /// The client uploads directly to storage, then the caller confirms
    /// with [`validate_file`](Self::validate_file).
    pub async fn upload_url(&self, send: &Send) -> SendResult<String> {
        let file = send
            .file
            .as_ref()
            .ok_or_else(|| SendError::not_found("send file", send.id))?;
        let blob_key = key::send_key(send.id, file.id);
        Ok(self
            .blobs
            .upload_url(&blob_key, self.settings.url_ttl())
            .await?)
    }

    /// Confirm a client-direct upload against the declared size.
    ///
    /// On success the blob is stamped with its descriptive metadata, which
    /// a direct upload cannot carry. On a mismatch or a missing object the
    /// whole Send is withdrawn, a file send without its file being useless.
    #[instrument(skip(self, send), fields(send_id = %send.id))]
    pub async fn validate_file(&self, send: &mut Send) -> SendResult<SizeCheck> {
        let file = send
            .file
            .clone()
            .ok_or_else(|| SendError::not_found("send file", send.id))?;

        let blob_key = key::send_key(send.id, file.id);
        let check = self
            .blobs
            .validate(&blob_key, file.size, self.settings.size_leeway_bytes)
            .await?;

        if check.ok {
            let tags = BlobTags::empty()
                .file_name(file.file_name.as_str())
                .owner(send.owner().to_string());
            if let Err(err) = self.blobs.stamp(&blob_key, &tags).await {
                warn!(key = %blob_key, error = %err, "could not stamp uploaded blob");
            }
            info!(file_id = %file.id, "send file verified");
        } else {
            warn!(
                file_id = %file.id,
                declared = file.size,
                actual = ?check.actual,
                "send file verification failed, withdrawing send"
            );
            self.delete(send.id).await?;
        }
        Ok(check)
    }
}
