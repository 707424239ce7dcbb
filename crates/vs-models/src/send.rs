//! Send model: a time-/access-limited shareable object, optionally carrying
//! one file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vs_core::{OrgId, OwnerId, SendFileId, SendId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendType {
    Text,
    File,
}

/// The single file a Send may carry. Immutable once committed; deleted
/// together with the Send row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFile {
    pub id: SendFileId,
    /// Opaque ciphertext of the original file name.
    pub file_name: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub id: SendId,
    pub user_id: Option<UserId>,
    pub organization_id: Option<OrgId>,
    pub send_type: SendType,
    /// Opaque ciphertext payload.
    pub data: String,
    pub file: Option<SendFile>,
    pub password_hash: Option<String>,
    pub disabled: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: DateTime<Utc>,
    pub max_access_count: Option<i32>,
    pub access_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Send {
    pub fn file_send(id: SendId, user_id: UserId, data: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: Some(user_id),
            organization_id: None,
            send_type: SendType::File,
            data: data.into(),
            file: None,
            password_hash: None,
            disabled: false,
            expiration_date: None,
            deletion_date: now + chrono::Duration::days(7),
            max_access_count: None,
            access_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The storage owner this send's file is accounted against.
    pub fn owner(&self) -> OwnerId {
        match (self.organization_id, self.user_id) {
            (Some(org), _) => OwnerId::Organization(org),
            (None, Some(user)) => OwnerId::User(user),
            (None, None) => OwnerId::User(UserId::nil()),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map(|e| e <= now).unwrap_or(false) || self.deletion_date <= now
    }

    /// Whether an access would currently be allowed. Password verification
    /// is the caller's concern; this only evaluates the stored gates.
    pub fn access_allowed(&self, now: DateTime<Utc>) -> bool {
        if self.disabled || self.is_expired(now) {
            return false;
        }
        match self.max_access_count {
            Some(max) => self.access_count < max,
            None => true,
        }
    }

    pub fn set_file(&mut self, file: SendFile) {
        self.file = Some(file);
        self.updated_at = Utc::now();
    }
}
