//! Cipher (vault item) model and attachment metadata.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vs_core::{AttachmentId, BlobBackend, CipherId, OrgId, OwnerId, UserId};

/// Metadata for one committed attachment.
///
/// Created only after the blob write has been attempted and confirmed;
/// removed on explicit deletion, on cipher deletion, or during an
/// owner-wide purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    /// Opaque ciphertext of the original file name.
    pub file_name: String,
    /// Declared size in bytes, confirmed against the stored object for
    /// client-direct uploads.
    pub size: i64,
    /// Which backend holds the blob.
    pub backend: BlobBackend,
    /// Encrypted per-attachment key, opaque to this subsystem.
    pub enc_key: Option<String>,
}

impl AttachmentMetadata {
    pub fn new(file_name: impl Into<String>, size: i64, backend: BlobBackend) -> Self {
        Self {
            file_name: file_name.into(),
            size,
            backend,
            enc_key: None,
        }
    }

    pub fn with_enc_key(mut self, enc_key: impl Into<String>) -> Self {
        self.enc_key = Some(enc_key.into());
        self
    }

    /// Human-readable size, for logs.
    pub fn human_size(&self) -> String {
        let size = self.size as f64;
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if size <= 0.0 {
            return "0 B".to_string();
        }

        let base = 1024.0_f64;
        let i = (size.ln() / base.ln()).floor() as usize;
        let i = i.min(UNITS.len() - 1);

        format!("{:.1} {}", size / base.powi(i as i32), UNITS[i])
    }
}

/// An encrypted vault item.
///
/// Exactly one owner: a user id or an organization id. During a share both
/// are transiently set; `owner()` resolves organization-first so accounting
/// follows the committed destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cipher {
    pub id: CipherId,
    pub user_id: Option<UserId>,
    pub organization_id: Option<OrgId>,
    /// Opaque ciphertext payload of the item itself.
    pub data: String,
    /// Attachment id -> metadata.
    pub attachments: HashMap<AttachmentId, AttachmentMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cipher {
    /// A cipher in personal custody.
    pub fn personal(id: CipherId, user_id: UserId, data: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: Some(user_id),
            organization_id: None,
            data: data.into(),
            attachments: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A cipher in organizational custody.
    pub fn organizational(id: CipherId, organization_id: OrgId, data: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: None,
            organization_id: Some(organization_id),
            data: data.into(),
            attachments: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The storage owner this cipher's attachments are accounted against.
    pub fn owner(&self) -> OwnerId {
        match (self.organization_id, self.user_id) {
            (Some(org), _) => OwnerId::Organization(org),
            (None, Some(user)) => OwnerId::User(user),
            // Constructors make this unreachable; keep a deterministic
            // answer for deserialized rows rather than panicking.
            (None, None) => OwnerId::User(UserId::nil()),
        }
    }

    pub fn has_organization(&self) -> bool {
        self.organization_id.is_some()
    }

    /// Total committed attachment bytes on this cipher.
    pub fn attachment_total_bytes(&self) -> i64 {
        self.attachments.values().map(|a| a.size).sum()
    }

    pub fn add_attachment(&mut self, id: AttachmentId, metadata: AttachmentMetadata) {
        self.attachments.insert(id, metadata);
        self.updated_at = Utc::now();
    }

    pub fn remove_attachment(&mut self, id: &AttachmentId) -> Option<AttachmentMetadata> {
        let removed = self.attachments.remove(id);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }
}
