//! Atomic submission of assembled vouchers

use tracing::{error, info};

use crate::traits::*;
use crate::types::*;

/// Commits a voucher to the store as one all-or-nothing unit
#[derive(Debug, Clone)]
pub struct TransactionExecutor<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> TransactionExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist `voucher` and return the store-assigned id
    ///
    /// Takes the voucher by value: once handed over it belongs to the store.
    /// No retry is attempted on any failure.
    pub async fn commit(&self, voucher: Voucher) -> LedgerResult<VoucherId> {
        voucher.validate()?;

        match self.store.commit_voucher(&voucher).await {
            Ok(id) => {
                info!(
                    voucher_id = %id,
                    number = voucher.header.number,
                    entries = voucher.entries.len(),
                    total = %voucher.total_debits(),
                    "voucher committed"
                );
                Ok(id)
            }
            Err(err) => {
                error!(number = voucher.header.number, error = %err, "voucher commit failed");
                Err(match err {
                    LedgerError::AllocationConflict(_)
                    | LedgerError::Commit(_)
                    | LedgerError::Validation(_) => err,
                    other => LedgerError::Commit(other.message().to_string()),
                })
            }
        }
    }
}
