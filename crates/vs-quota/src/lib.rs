//! # vs-quota
//!
//! Storage quota accounting: one ledger per deployment holding each owner's
//! quota and running consumed-bytes total, mutated only through signed
//! deltas.

pub mod ledger;

pub use ledger::{MemoryQuotaLedger, QuotaError, QuotaLedger, QuotaResult};
