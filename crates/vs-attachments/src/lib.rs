//! # vs-attachments
//!
//! Attachment lifecycle orchestration for Vaultstore RS.
//!
//! ## Features
//!
//! - Create / delete / verify cipher attachments with quota enforcement
//! - Time-limited upload and download grants
//! - The personal-to-organization share saga with best-effort rollback
//! - Staging cleanup with an observable outcome
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vs_attachments::{AllowAll, AttachmentService, MemoryCipherStore, MemoryOrgStore, NullNotifier};
//! use vs_quota::MemoryQuotaLedger;
//! use vs_storage::MemoryBlobStore;
//!
//! let service = AttachmentService::new(
//!     Arc::new(MemoryCipherStore::new()),
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(MemoryQuotaLedger::new()),
//!     Arc::new(MemoryOrgStore::new()),
//!     Arc::new(AllowAll),
//!     Arc::new(NullNotifier),
//!     Default::default(),
//! );
//! let id = service.create(&mut cipher, data, "2.encname", len, user_id).await?;
//! ```

pub mod service;
pub mod share;
pub mod store;

pub use service::{AttachmentError, AttachmentResult, AttachmentService};
pub use share::CleanupOutcome;
pub use store::{
    AllowAll, ChangeNotifier, CipherStore, EditGate, MemoryCipherStore, MemoryOrgStore,
    NullNotifier, OrgStore,
};
