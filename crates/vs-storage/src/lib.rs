//! # vs-storage
//!
//! Blob addressing and storage backends for Vaultstore RS.
//!
//! ## Features
//!
//! - Pure key build/parse for attachment and send blobs (`key`)
//! - The `BlobStore` backend contract: writes, presigned upload/download
//!   grants, idempotent copy/delete, bulk prefix deletion, size validation
//! - Adapters: local filesystem, S3-compatible object store, in-memory
//!
//! ## Example
//!
//! ```rust,ignore
//! use vs_storage::{key, BlobStore, BlobTags, MemoryBlobStore};
//!
//! let blobs = MemoryBlobStore::new();
//! let k = key::attachment_key(cipher_id, attachment_id, None, false);
//! blobs.write_new(&k, bytes::Bytes::from(ciphertext), &BlobTags::empty()).await?;
//! ```

pub mod backend;
pub mod key;
pub mod local;
pub mod memory;
pub mod s3;

pub use backend::{BlobError, BlobResult, BlobStore, BlobTags, SizeCheck};
pub use key::{parse_attachment_key, ParsedAttachmentKey, STAGING_PREFIX};
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;
