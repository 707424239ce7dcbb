//! Storage quota for a user or organization.

use serde::{Deserialize, Serialize};

/// How much storage an owner may consume.
///
/// `Disabled` models an owner whose plan has no storage feature at all:
/// any positive request is rejected. `Unlimited` never rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "bytes")]
pub enum StorageQuota {
    Unlimited,
    Limited(i64),
    Disabled,
}

impl StorageQuota {
    /// Remaining bytes given the owner's consumed total.
    /// `None` means unlimited.
    pub fn remaining(&self, consumed: i64) -> Option<i64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(quota) => Some((quota - consumed).max(0)),
            Self::Disabled => Some(0),
        }
    }

    /// Whether a request of `bytes` fits.
    pub fn allows(&self, consumed: i64, bytes: i64) -> bool {
        match self.remaining(consumed) {
            None => true,
            Some(remaining) => bytes <= remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited() {
        let quota = StorageQuota::Limited(100);
        assert_eq!(quota.remaining(40), Some(60));
        assert_eq!(quota.remaining(150), Some(0));
        assert!(quota.allows(40, 60));
        assert!(!quota.allows(40, 61));
    }

    #[test]
    fn test_unlimited() {
        let quota = StorageQuota::Unlimited;
        assert_eq!(quota.remaining(i64::MAX), None);
        assert!(quota.allows(i64::MAX, i64::MAX));
    }

    #[test]
    fn test_disabled_rejects_any_positive_request() {
        let quota = StorageQuota::Disabled;
        assert_eq!(quota.remaining(0), Some(0));
        assert!(!quota.allows(0, 1));
        assert!(quota.allows(0, 0));
    }
}
