//! Shared id types, owner identity, and the blob-backend tag.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User primary key.
pub type UserId = Uuid;
/// Organization primary key.
pub type OrgId = Uuid;
/// Cipher (vault item) primary key.
pub type CipherId = Uuid;
/// Attachment id, random per attachment.
pub type AttachmentId = Uuid;
/// Send primary key.
pub type SendId = Uuid;
/// Send file id, random per file.
pub type SendFileId = Uuid;

/// The storage owner of a cipher, attachment, or send.
///
/// Quotas and consumed-byte totals are accounted against exactly one of
/// these per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum OwnerId {
    User(UserId),
    Organization(OrgId),
}

impl OwnerId {
    pub fn id(&self) -> Uuid {
        match self {
            Self::User(id) => *id,
            Self::Organization(id) => *id,
        }
    }

    pub fn is_organization(&self) -> bool {
        matches!(self, Self::Organization(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Organization(_) => "organization",
        }
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Which backend an attachment's blob lives on.
///
/// Chosen once when the attachment is created, stored in its metadata, and
/// dispatched through the single `BlobStore` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    S3,
    Local,
    Memory,
}

impl BlobBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "s3" => Some(Self::S3),
            "local" => Some(Self::Local),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for BlobBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_accessors() {
        let uid = Uuid::new_v4();
        let owner = OwnerId::User(uid);
        assert_eq!(owner.id(), uid);
        assert!(!owner.is_organization());
        assert_eq!(owner.kind(), "user");

        let oid = Uuid::new_v4();
        let owner = OwnerId::Organization(oid);
        assert!(owner.is_organization());
        assert_eq!(owner.to_string(), format!("organization:{}", oid));
    }

    #[test]
    fn test_backend_tag_round_trip() {
        for backend in [BlobBackend::S3, BlobBackend::Local, BlobBackend::Memory] {
            assert_eq!(BlobBackend::from_str(backend.as_str()), Some(backend));
        }
        assert_eq!(BlobBackend::from_str("azure"), None);
    }
}
