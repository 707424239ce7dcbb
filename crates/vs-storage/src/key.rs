//! Blob addressing: backend-neutral keys for attachment and send blobs.
//!
//! Keys are derived, never stored. Parsing must recover ownership from the
//! key alone because bulk cleanup enumerates by prefix.
//!
//! Stable formats:
//! - personal attachment:  `{cipherId}/{attachmentId}`
//! - org attachment:       `{cipherId}/{organizationId}/{attachmentId}`
//! - staged personal:      `temp/{cipherId}/{attachmentId}`
//! - staged org-share:     `temp/{cipherId}/{organizationId}/{attachmentId}`
//! - send file:            `{sendId}/{fileId}`

use uuid::Uuid;
use vs_core::{AttachmentId, CipherId, OrgId, SendFileId, SendId};

use crate::backend::{BlobError, BlobResult};

/// Prefix marking an uncommitted object, excluded from quota and subject to
/// cleanup.
pub const STAGING_PREFIX: &str = "temp";

/// Key for an attachment blob.
pub fn attachment_key(
    cipher_id: CipherId,
    attachment_id: AttachmentId,
    organization_id: Option<OrgId>,
    staged: bool,
) -> String {
    let base = match organization_id {
        Some(org) => format!("{}/{}/{}", cipher_id, org, attachment_id),
        None => format!("{}/{}", cipher_id, attachment_id),
    };
    if staged {
        format!("{}/{}", STAGING_PREFIX, base)
    } else {
        base
    }
}

/// Key for a send's file blob.
pub fn send_key(send_id: SendId, file_id: SendFileId) -> String {
    format!("{}/{}", send_id, file_id)
}

/// Prefix covering every committed blob of a cipher.
pub fn cipher_prefix(cipher_id: CipherId) -> String {
    cipher_id.to_string()
}

/// Prefix covering every staged blob of a cipher.
pub fn staging_prefix(cipher_id: CipherId) -> String {
    format!("{}/{}", STAGING_PREFIX, cipher_id)
}

/// Prefix covering a send's blobs.
pub fn send_prefix(send_id: SendId) -> String {
    send_id.to_string()
}

/// Ownership recovered from an attachment key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAttachmentKey {
    pub cipher_id: CipherId,
    pub organization_id: Option<OrgId>,
    pub attachment_id: AttachmentId,
    pub staged: bool,
}

/// Parse any of the 2-4 segment attachment key forms.
pub fn parse_attachment_key(key: &str) -> BlobResult<ParsedAttachmentKey> {
    let mut segments: Vec<&str> = key.split('/').collect();

    let staged = segments.first() == Some(&STAGING_PREFIX);
    if staged {
        segments.remove(0);
    }

    let parse = |s: &str| -> BlobResult<Uuid> {
        Uuid::parse_str(s).map_err(|_| BlobError::InvalidKey(key.to_string()))
    };

    match segments.as_slice() {
        [cipher, attachment] => Ok(ParsedAttachmentKey {
            cipher_id: parse(cipher)?,
            organization_id: None,
            attachment_id: parse(attachment)?,
            staged,
        }),
        [cipher, org, attachment] => Ok(ParsedAttachmentKey {
            cipher_id: parse(cipher)?,
            organization_id: Some(parse(org)?),
            attachment_id: parse(attachment)?,
            staged,
        }),
        _ => Err(BlobError::InvalidKey(key.to_string())),
    }
}
