//! The quota ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use vs_core::OwnerId;
use vs_models::StorageQuota;

/// Quota errors
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Unknown storage owner: {0}")]
    UnknownOwner(OwnerId),
    #[error("Storage quota exceeded: requested {requested} bytes, {remaining} remaining")]
    Exceeded { requested: i64, remaining: i64 },
    #[error("Ledger error: {0}")]
    Ledger(String),
}

pub type QuotaResult<T> = Result<T, QuotaError>;

/// Per-owner quota and consumed-bytes accounting.
///
/// Consumed totals move only through `apply` with a signed delta, alongside
/// the metadata write that justifies the change. The quota check and the
/// blob write are not transactional; concurrent uploads can race past the
/// check. That race is accepted, not corrected here.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// The owner's configured quota.
    async fn quota(&self, owner: OwnerId) -> QuotaResult<StorageQuota>;

    /// The owner's running consumed-bytes total.
    async fn consumed(&self, owner: OwnerId) -> QuotaResult<i64>;

    /// Apply a signed delta to the consumed total, saturating at zero.
    /// Returns the new total.
    async fn apply(&self, owner: OwnerId, delta: i64) -> QuotaResult<i64>;

    /// Remaining bytes for the owner. `None` means unlimited.
    async fn remaining(&self, owner: OwnerId) -> QuotaResult<Option<i64>> {
        let quota = self.quota(owner).await?;
        let consumed = self.consumed(owner).await?;
        Ok(quota.remaining(consumed))
    }

    /// Fail with `Exceeded` if `requested` bytes do not fit. Must run
    /// before any storage write.
    async fn check(&self, owner: OwnerId, requested: i64) -> QuotaResult<()> {
        match self.remaining(owner).await? {
            None => Ok(()),
            Some(remaining) if requested <= remaining => Ok(()),
            Some(remaining) => Err(QuotaError::Exceeded { requested, remaining }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Account {
    quota: StorageQuota,
    consumed: i64,
}

/// In-memory ledger for tests.
pub struct MemoryQuotaLedger {
    accounts: RwLock<HashMap<OwnerId, Account>>,
}

impl Default for MemoryQuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQuotaLedger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Seed an owner's quota. Consumed starts at zero.
    pub async fn set_quota(&self, owner: OwnerId, quota: StorageQuota) {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(owner)
            .and_modify(|account| account.quota = quota)
            .or_insert(Account { quota, consumed: 0 });
    }
}

#[async_trait]
impl QuotaLedger for MemoryQuotaLedger {
    async fn quota(&self, owner: OwnerId) -> QuotaResult<StorageQuota> {
        let accounts = self.accounts.read().await;
        accounts
            .get(&owner)
            .map(|account| account.quota)
            .ok_or(QuotaError::UnknownOwner(owner))
    }

    async fn consumed(&self, owner: OwnerId) -> QuotaResult<i64> {
        let accounts = self.accounts.read().await;
        accounts
            .get(&owner)
            .map(|account| account.consumed)
            .ok_or(QuotaError::UnknownOwner(owner))
    }

    async fn apply(&self, owner: OwnerId, delta: i64) -> QuotaResult<i64> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&owner)
            .ok_or(QuotaError::UnknownOwner(owner))?;
        account.consumed = (account.consumed + delta).max(0);
        debug!(owner = %owner, delta = delta, consumed = account.consumed, "ledger applied");
        Ok(account.consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> OwnerId {
        OwnerId::User(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_check_against_limited_quota() {
        let ledger = MemoryQuotaLedger::new();
        let owner = user();
        ledger.set_quota(owner, StorageQuota::Limited(100)).await;

        ledger.check(owner, 100).await.unwrap();
        ledger.apply(owner, 60).await.unwrap();

        assert_eq!(ledger.remaining(owner).await.unwrap(), Some(40));
        ledger.check(owner, 40).await.unwrap();
        let err = ledger.check(owner, 41).await.unwrap_err();
        assert!(matches!(
            err,
            QuotaError::Exceeded { requested: 41, remaining: 40 }
        ));
    }

    #[tokio::test]
    async fn test_unlimited_never_rejects() {
        let ledger = MemoryQuotaLedger::new();
        let owner = user();
        ledger.set_quota(owner, StorageQuota::Unlimited).await;
        ledger.apply(owner, i64::MAX / 2).await.unwrap();
        assert_eq!(ledger.remaining(owner).await.unwrap(), None);
        ledger.check(owner, i64::MAX / 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_rejects_any_positive_request() {
        let ledger = MemoryQuotaLedger::new();
        let owner = user();
        ledger.set_quota(owner, StorageQuota::Disabled).await;
        assert!(ledger.check(owner, 1).await.is_err());
        ledger.check(owner, 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_saturates_at_zero() {
        let ledger = MemoryQuotaLedger::new();
        let owner = user();
        ledger.set_quota(owner, StorageQuota::Limited(100)).await;
        ledger.apply(owner, 30).await.unwrap();
        assert_eq!(ledger.apply(owner, -50).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_owner() {
        let ledger = MemoryQuotaLedger::new();
        assert!(matches!(
            ledger.consumed(user()).await,
            Err(QuotaError::UnknownOwner(_))
        ));
    }
}
