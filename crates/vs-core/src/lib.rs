//! # vs-core
//!
//! Core types and configuration for Vaultstore RS.
//!
//! This crate provides the building blocks shared by every other crate:
//! - Id aliases for the vault domain
//! - Owner identity (user vs. organization)
//! - The closed blob-backend tag
//! - Storage configuration loaded from the environment

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
