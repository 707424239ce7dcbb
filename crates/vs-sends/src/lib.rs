//! # vs-sends
//!
//! Send file lifecycle for Vaultstore RS: attach one file to a Send,
//! verify client-direct uploads, hand out time-limited grants, and
//! release storage when the Send goes away.

pub mod service;
pub mod store;

pub use service::{SendError, SendFileService, SendResult};
pub use store::{MemorySendStore, NullSendNotifier, SendNotifier, SendStore};
