//! In-memory ledger store for testing and development

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::normalize::NamePattern;
use crate::traits::*;
use crate::types::*;

/// A posting recorded before the current sync, used for account reuse
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalEntry {
    pub detail_code: String,
    pub general_account_id: i64,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

/// A voucher accepted by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVoucher {
    pub id: VoucherId,
    pub voucher: Voucher,
}

#[derive(Debug, Default)]
struct Catalog {
    detail_accounts: Vec<DetailAccount>,
    general_accounts: Vec<GeneralAccount>,
    account_groups: HashMap<i64, i64>,
    detail_type_accounts: HashMap<i64, i64>,
    fiscal_years: Vec<i64>,
    history: Vec<HistoricalEntry>,
    vouchers: Vec<StoredVoucher>,
    last_voucher_id: i64,
    search_failure: Option<String>,
    commit_failure: Option<String>,
}

/// In-memory ledger store implementation for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    catalog: Arc<RwLock<Catalog>>,
    search_calls: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a detail account; catalog order is insertion order
    pub fn add_detail_account(&self, code: &str, type_id: i64, title: &str) -> &Self {
        self.write_catalog().detail_accounts.push(DetailAccount {
            code: code.to_string(),
            type_id,
            title: title.to_string(),
        });
        self
    }

    /// Append a general account under a general-ledger account
    pub fn add_general_account(
        &self,
        id: i64,
        code: &str,
        title: &str,
        ledger_account_id: i64,
    ) -> &Self {
        self.write_catalog().general_accounts.push(GeneralAccount {
            id,
            code: code.to_string(),
            title: title.to_string(),
            ledger_account_id,
        });
        self
    }

    /// Register the account group of a general-ledger account
    pub fn add_ledger_account(&self, ledger_account_id: i64, account_group_id: i64) -> &Self {
        self.write_catalog()
            .account_groups
            .insert(ledger_account_id, account_group_id);
        self
    }

    /// Relate a detail-account type to a general account
    pub fn relate_detail_type(&self, detail_type_id: i64, general_account_id: i64) -> &Self {
        self.write_catalog()
            .detail_type_accounts
            .insert(detail_type_id, general_account_id);
        self
    }

    pub fn add_fiscal_year(&self, fiscal_year_id: i64) -> &Self {
        self.write_catalog().fiscal_years.push(fiscal_year_id);
        self
    }

    /// Record a historical posting of `detail_code` to a general account
    pub fn add_historical_entry(
        &self,
        detail_code: &str,
        general_account_id: i64,
        side: EntrySide,
        amount: BigDecimal,
    ) -> &Self {
        let (debit, credit) = match side {
            EntrySide::Debit => (amount, BigDecimal::from(0)),
            EntrySide::Credit => (BigDecimal::from(0), amount),
        };
        self.write_catalog().history.push(HistoricalEntry {
            detail_code: detail_code.to_string(),
            general_account_id,
            debit,
            credit,
        });
        self
    }

    /// Make every catalog search fail with `message`
    pub fn fail_searches(&self, message: &str) {
        self.write_catalog().search_failure = Some(message.to_string());
    }

    /// Make the next commits fail with `message`
    pub fn fail_commits(&self, message: &str) {
        self.write_catalog().commit_failure = Some(message.to_string());
    }

    /// Number of catalog name searches performed so far
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// All vouchers committed so far, in commit order
    pub fn vouchers(&self) -> Vec<StoredVoucher> {
        self.read_catalog().vouchers.clone()
    }

    fn read_catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_catalog(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_search(&self) -> LedgerResult<RwLockReadGuard<'_, Catalog>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let catalog = self.read_catalog();
        match &catalog.search_failure {
            Some(message) => Err(LedgerError::Storage(message.clone())),
            None => Ok(catalog),
        }
    }
}

impl Catalog {
    fn account_ref(&self, account: &GeneralAccount) -> LedgerResult<AccountRef> {
        let account_group_id = self
            .account_groups
            .get(&account.ledger_account_id)
            .copied()
            .ok_or_else(|| {
                LedgerError::Storage(format!(
                    "General ledger account {} has no account group",
                    account.ledger_account_id
                ))
            })?;
        Ok(AccountRef {
            general_account_id: account.id,
            ledger_account_id: account.ledger_account_id,
            account_group_id,
            code: account.code.clone(),
        })
    }

    fn check_numbering(&self, header: &VoucherHeader) -> LedgerResult<()> {
        for stored in &self.vouchers {
            let other = &stored.voucher.header;
            let same_ledger_year = other.scope().lock_key() == header.scope().lock_key();
            let same_scope = other.scope() == header.scope();

            if same_ledger_year && other.number == header.number {
                return Err(LedgerError::AllocationConflict(format!(
                    "Voucher number {} already exists",
                    header.number
                )));
            }
            if same_scope && other.sequence == header.sequence {
                return Err(LedgerError::AllocationConflict(format!(
                    "Voucher sequence {} already exists",
                    header.sequence
                )));
            }
            if same_scope && other.date == header.date && other.daily_number == header.daily_number
            {
                return Err(LedgerError::AllocationConflict(format!(
                    "Daily number {} already exists for {}",
                    header.daily_number, header.date
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_detail_accounts(&self, pattern: &NamePattern) -> LedgerResult<Vec<DetailAccount>> {
        let catalog = self.begin_search()?;
        Ok(catalog
            .detail_accounts
            .iter()
            .filter(|account| pattern.matches(&account.title))
            .cloned()
            .collect())
    }

    async fn find_general_accounts(
        &self,
        pattern: &NamePattern,
        exclusions: &AccountExclusions,
    ) -> LedgerResult<Vec<GeneralAccount>> {
        let catalog = self.begin_search()?;
        Ok(catalog
            .general_accounts
            .iter()
            .filter(|account| !exclusions.excludes(account) && pattern.matches(&account.title))
            .cloned()
            .collect())
    }

    async fn account_by_code(&self, code: &str) -> LedgerResult<Option<AccountRef>> {
        let catalog = self.read_catalog();
        catalog
            .general_accounts
            .iter()
            .find(|account| account.code == code)
            .map(|account| catalog.account_ref(account))
            .transpose()
    }

    async fn account_by_id(&self, general_account_id: i64) -> LedgerResult<Option<AccountRef>> {
        let catalog = self.read_catalog();
        catalog
            .general_accounts
            .iter()
            .find(|account| account.id == general_account_id)
            .map(|account| catalog.account_ref(account))
            .transpose()
    }

    async fn last_posting_account(
        &self,
        detail_code: &str,
        side: EntrySide,
    ) -> LedgerResult<Option<i64>> {
        let zero = BigDecimal::from(0);
        let catalog = self.read_catalog();
        Ok(catalog
            .history
            .iter()
            .rev()
            .find(|entry| {
                entry.detail_code == detail_code
                    && match side {
                        EntrySide::Debit => entry.debit > zero,
                        EntrySide::Credit => entry.credit > zero,
                    }
            })
            .map(|entry| entry.general_account_id))
    }

    async fn detail_type_account(&self, detail_type_id: i64) -> LedgerResult<Option<i64>> {
        Ok(self
            .read_catalog()
            .detail_type_accounts
            .get(&detail_type_id)
            .copied())
    }

    async fn latest_fiscal_year(&self) -> LedgerResult<Option<i64>> {
        Ok(self.read_catalog().fiscal_years.iter().max().copied())
    }

    async fn voucher_counters(
        &self,
        scope: &NumberingScope,
        date: NaiveDate,
    ) -> LedgerResult<VoucherCounters> {
        let catalog = self.read_catalog();
        let mut counters = VoucherCounters::default();

        for stored in &catalog.vouchers {
            let header = &stored.voucher.header;
            if header.fiscal_year_id != scope.fiscal_year_id || header.ledger_id != scope.ledger_id
            {
                continue;
            }
            counters.number = counters.number.max(header.number);
            if header.branch_id != scope.branch_id {
                continue;
            }
            counters.sequence = counters.sequence.max(header.sequence);
            if header.date == date {
                counters.daily_number = counters.daily_number.max(header.daily_number);
            }
        }

        Ok(counters)
    }

    async fn commit_voucher(&self, voucher: &Voucher) -> LedgerResult<VoucherId> {
        // One write guard for the whole commit keeps it all-or-nothing.
        let mut catalog = self.write_catalog();

        if let Some(message) = &catalog.commit_failure {
            return Err(LedgerError::Commit(message.clone()));
        }

        catalog.check_numbering(&voucher.header)?;

        for entry in &voucher.entries {
            let exists = catalog
                .general_accounts
                .iter()
                .any(|account| account.id == entry.account.general_account_id);
            if !exists {
                return Err(LedgerError::Commit(format!(
                    "Row {} references unknown general account {}",
                    entry.row_number, entry.account.general_account_id
                )));
            }
        }

        catalog.last_voucher_id += 1;
        let id = VoucherId(catalog.last_voucher_id);

        for entry in &voucher.entries {
            if let Some(detail_code) = &entry.detail_code {
                catalog.history.push(HistoricalEntry {
                    detail_code: detail_code.clone(),
                    general_account_id: entry.account.general_account_id,
                    debit: entry.debit.clone(),
                    credit: entry.credit.clone(),
                });
            }
        }
        catalog.vouchers.push(StoredVoucher {
            id,
            voucher: voucher.clone(),
        });

        Ok(id)
    }
}
