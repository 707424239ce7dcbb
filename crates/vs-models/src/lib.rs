//! # vs-models
//!
//! Vault domain models for Vaultstore RS:
//! - `Cipher` and its `AttachmentMetadata` map
//! - `Send` and its optional `SendFile`
//! - `StorageQuota` (unlimited / limited / disabled)

pub mod cipher;
pub mod owner;
pub mod send;

pub use cipher::{AttachmentMetadata, Cipher};
pub use owner::StorageQuota;
pub use send::{Send, SendFile, SendType};
