//! Voucher assembly: posting-account selection, entry layout and numbering

use bigdecimal::BigDecimal;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_request;

/// Memo prefix of the aggregate bank entry ("total of voucher number")
pub const BANK_MEMO_PREFIX: &str = "جمع سند شماره";

/// Builder laying out ledger entries with contiguous row numbers
#[derive(Debug)]
pub struct VoucherBuilder {
    voucher: Voucher,
}

impl VoucherBuilder {
    /// Create a new voucher builder
    pub fn new(header: VoucherHeader) -> Self {
        Self {
            voucher: Voucher {
                header,
                entries: Vec::new(),
            },
        }
    }

    fn next_row(&self) -> u32 {
        self.voucher.entries.len() as u32 + 1
    }

    /// Add an entry on the given side
    pub fn entry(mut self, account: AccountRef, side: EntrySide, amount: BigDecimal, memo: String) -> Self {
        let row = self.next_row();
        self.voucher
            .entries
            .push(LedgerEntry::new(row, account, side, amount, memo));
        self
    }

    /// Add an entry that also names a detail account
    pub fn detail_entry(
        mut self,
        account: AccountRef,
        detail_code: String,
        detail_type_id: Option<i64>,
        side: EntrySide,
        amount: BigDecimal,
        memo: String,
    ) -> Self {
        let row = self.next_row();
        let entry = LedgerEntry::new(row, account, side, amount, memo)
            .with_detail(Some(detail_code), detail_type_id);
        self.voucher.entries.push(entry);
        self
    }

    /// Add a debit entry
    pub fn debit(self, account: AccountRef, amount: BigDecimal, memo: String) -> Self {
        self.entry(account, EntrySide::Debit, amount, memo)
    }

    /// Add a credit entry
    pub fn credit(self, account: AccountRef, amount: BigDecimal, memo: String) -> Self {
        self.entry(account, EntrySide::Credit, amount, memo)
    }

    /// Build the voucher, checking balance and per-entry invariants
    pub fn build(self) -> LedgerResult<Voucher> {
        self.voucher.validate()?;
        Ok(self.voucher)
    }
}

/// Turns routed statement items into a balanced, numbered voucher
#[derive(Debug, Clone)]
pub struct VoucherAssembler<S: LedgerStore> {
    store: S,
    config: SyncConfig,
}

impl<S: LedgerStore> VoucherAssembler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    pub fn with_config(store: S, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Branch, active fiscal year and ledger the request will be numbered in
    pub async fn numbering_scope(&self, request: &SyncRequest) -> LedgerResult<NumberingScope> {
        let fiscal_year_id = self
            .store
            .latest_fiscal_year()
            .await?
            .ok_or_else(|| LedgerError::Storage("No fiscal year is defined".to_string()))?;

        Ok(NumberingScope {
            branch_id: request.branch_id.unwrap_or(self.config.default_branch_id),
            fiscal_year_id,
            ledger_id: self.config.default_ledger_id,
        })
    }

    /// Allocate header numbers as current max + 1 within `scope`
    ///
    /// Callers must hold the scope's allocation lock until the voucher is
    /// committed.
    pub async fn allocate_header(
        &self,
        request: &SyncRequest,
        scope: NumberingScope,
    ) -> LedgerResult<VoucherHeader> {
        let next = self
            .store
            .voucher_counters(&scope, request.date)
            .await?
            .next();

        Ok(VoucherHeader {
            branch_id: scope.branch_id,
            fiscal_year_id: scope.fiscal_year_id,
            ledger_id: scope.ledger_id,
            voucher_type_id: self.config.voucher_type_id,
            number: next.number,
            sequence: next.sequence,
            daily_number: next.daily_number,
            date: request.date,
            description: request.description.clone(),
        })
    }

    /// Build the voucher: one entry per item in input order, then the
    /// aggregate bank entry on the opposite side
    pub async fn assemble(
        &self,
        request: &SyncRequest,
        routings: &[ItemRouting],
        header: VoucherHeader,
    ) -> LedgerResult<Voucher> {
        validate_request(request)?;
        if routings.len() != request.items.len() {
            return Err(LedgerError::Validation(format!(
                "Expected {} item routings, got {}",
                request.items.len(),
                routings.len()
            )));
        }

        let side = request.mode.counterparty_side();
        let bank_memo = format!("{BANK_MEMO_PREFIX} {}", header.number);
        let mut builder = VoucherBuilder::new(header);

        for (item, routing) in request.items.iter().zip(routings) {
            let account = self.posting_account(request.mode, routing).await?;
            let memo = item
                .description
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or(&request.description)
                .to_string();

            builder = match routing {
                ItemRouting::Counterparty(AccountResolution {
                    detail_code: Some(code),
                    detail_type_id,
                    ..
                }) => builder.detail_entry(
                    account,
                    code.clone(),
                    *detail_type_id,
                    side,
                    item.amount.clone(),
                    memo,
                ),
                _ => builder.entry(account, side, item.amount.clone(), memo),
            };
        }

        let bank = self.account(self.config.bank_account_id).await?;
        builder
            .entry(bank, request.mode.bank_side(), request.total_amount.clone(), bank_memo)
            .build()
    }

    /// Select the general account an item posts to
    async fn posting_account(&self, mode: SyncMode, routing: &ItemRouting) -> LedgerResult<AccountRef> {
        let resolution = match routing {
            ItemRouting::Fee => {
                return match self.store.account_by_code(&self.config.fee_account_code).await? {
                    Some(account) => Ok(account),
                    None => {
                        warn!(code = %self.config.fee_account_code, "fee account missing, using default");
                        self.default_account(mode).await
                    }
                };
            }
            ItemRouting::Counterparty(resolution) => resolution,
        };

        if let Some(detail_code) = &resolution.detail_code {
            let mut account_id = self
                .store
                .last_posting_account(detail_code, mode.counterparty_side())
                .await?;
            if account_id.is_none() {
                if let Some(type_id) = resolution.detail_type_id {
                    account_id = self.store.detail_type_account(type_id).await?;
                }
            }
            return match account_id {
                Some(id) => {
                    debug!(detail = %detail_code, account_id = id, "posting detail under general account");
                    self.account(id).await
                }
                None => {
                    warn!(detail = %detail_code, "no general account for detail, using default");
                    self.default_account(mode).await
                }
            };
        }

        if let Some(id) = resolution.general_account_id {
            return self.account(id).await;
        }

        warn!(party = %resolution.matched_title, "unresolved party, using default account");
        self.default_account(mode).await
    }

    /// Mode default by code, then the last-resort id
    async fn default_account(&self, mode: SyncMode) -> LedgerResult<AccountRef> {
        if let Some(account) = self.store.account_by_code(self.config.default_code(mode)).await? {
            return Ok(account);
        }
        self.account(self.config.last_resort_account_id).await
    }

    async fn account(&self, general_account_id: i64) -> LedgerResult<AccountRef> {
        self.store
            .account_by_id(general_account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(general_account_id.to_string()))
    }
}
