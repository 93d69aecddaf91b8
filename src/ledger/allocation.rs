//! Mutual exclusion for voucher-number allocation
//!
//! `number`, `sequence` and `daily_number` are read as "current max + 1" and
//! written by the commit. Between those two points the numbering scope must
//! be held exclusively, otherwise two callers can read the same maximum.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::NumberingScope;

/// Held while a scope's counters are read and the voucher is committed
#[derive(Debug)]
pub struct ScopeGuard {
    scope: NumberingScope,
    _guard: OwnedMutexGuard<()>,
}

impl ScopeGuard {
    pub fn scope(&self) -> &NumberingScope {
        &self.scope
    }
}

/// One async lock per fiscal year × ledger
#[derive(Debug, Clone, Default)]
pub struct AllocationLocks {
    locks: Arc<Mutex<HashMap<(i64, i64), Arc<AsyncMutex<()>>>>>,
}

impl AllocationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `scope` is free and take it
    pub async fn acquire(&self, scope: NumberingScope) -> ScopeGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(scope.lock_key())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        ScopeGuard {
            scope,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of scopes seen so far
    pub fn scope_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scope(branch_id: i64, fiscal_year_id: i64) -> NumberingScope {
        NumberingScope {
            branch_id,
            fiscal_year_id,
            ledger_id: 1,
        }
    }

    #[tokio::test]
    async fn test_same_scope_is_exclusive() {
        let locks = AllocationLocks::new();
        let held = locks.acquire(scope(1, 5)).await;
        assert_eq!(held.scope().fiscal_year_id, 5);

        let waiting = tokio::time::timeout(Duration::from_millis(50), locks.acquire(scope(1, 5))).await;
        assert!(waiting.is_err());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire(scope(1, 5))).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_branches_share_the_number_scope() {
        let locks = AllocationLocks::new();
        let _held = locks.acquire(scope(1, 5)).await;

        let other_branch =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(scope(2, 5))).await;
        assert!(other_branch.is_err());
        assert_eq!(locks.scope_count(), 1);
    }

    #[tokio::test]
    async fn test_other_fiscal_year_is_independent() {
        let locks = AllocationLocks::new();
        let _held = locks.acquire(scope(1, 5)).await;

        let other_year =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(scope(1, 6))).await;
        assert!(other_year.is_ok());
        assert_eq!(locks.scope_count(), 2);
    }
}
