//! Persistence seam for sends.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vs_core::SendId;
use vs_models::Send;

use crate::service::SendResult;

/// Send row storage.
#[async_trait]
pub trait SendStore: std::marker::Send + Sync {
    async fn get(&self, id: SendId) -> SendResult<Option<Send>>;

    /// Persist the full send row, overwriting any previous state.
    async fn replace(&self, send: &Send) -> SendResult<()>;

    /// Remove the row. Absent rows are a no-op.
    async fn delete(&self, id: SendId) -> SendResult<()>;
}

/// Push notification hook, fired after a send mutation commits.
#[async_trait]
pub trait SendNotifier: std::marker::Send + Sync {
    async fn send_updated(&self, send: &Send);
    async fn send_deleted(&self, id: SendId);
}

/// Notifier that drops every event.
pub struct NullSendNotifier;

#[async_trait]
impl SendNotifier for NullSendNotifier {
    async fn send_updated(&self, _send: &Send) {}
    async fn send_deleted(&self, _id: SendId) {}
}

/// In-memory send store for tests.
pub struct MemorySendStore {
    sends: RwLock<HashMap<SendId, Send>>,
}

impl Default for MemorySendStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySendStore {
    pub fn new() -> Self {
        Self {
            sends: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a send row.
    pub async fn insert(&self, send: Send) {
        let mut sends = self.sends.write().await;
        sends.insert(send.id, send);
    }
}

#[async_trait]
impl SendStore for MemorySendStore {
    async fn get(&self, id: SendId) -> SendResult<Option<Send>> {
        let sends = self.sends.read().await;
        Ok(sends.get(&id).cloned())
    }

    async fn replace(&self, send: &Send) -> SendResult<()> {
        let mut sends = self.sends.write().await;
        sends.insert(send.id, send.clone());
        Ok(())
    }

    async fn delete(&self, id: SendId) -> SendResult<()> {
        let mut sends = self.sends.write().await;
        sends.remove(&id);
        Ok(())
    }
}
