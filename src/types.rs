//! Core types and data structures for statement-to-voucher synthesis

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the bank statement batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Money came into the bank account; counterparties are credited
    Deposit,
    /// Money left the bank account; counterparties are debited
    Withdrawal,
}

impl SyncMode {
    /// Side on which every counterparty entry is posted
    pub fn counterparty_side(&self) -> EntrySide {
        match self {
            SyncMode::Deposit => EntrySide::Credit,
            SyncMode::Withdrawal => EntrySide::Debit,
        }
    }

    /// Side on which the aggregate bank entry is posted
    pub fn bank_side(&self) -> EntrySide {
        self.counterparty_side().opposite()
    }
}

/// Side of a ledger entry in double-entry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn opposite(&self) -> EntrySide {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }
}

/// One line of a bank statement, as shaped by the extraction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    /// Free-text counterparty name as printed on the statement
    #[serde(default)]
    pub party_name: String,
    pub amount: BigDecimal,
    #[serde(default, alias = "desc")]
    pub description: Option<String>,
    #[serde(default, alias = "tracking")]
    pub tracking_code: Option<String>,
}

impl TransactionItem {
    pub fn new(party_name: impl Into<String>, amount: BigDecimal) -> Self {
        Self {
            party_name: party_name.into(),
            amount,
            description: None,
            tracking_code: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tracking_code(mut self, tracking_code: impl Into<String>) -> Self {
        self.tracking_code = Some(tracking_code.into());
        self
    }
}

/// A batch of statement lines to be booked as one voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub mode: SyncMode,
    pub date: NaiveDate,
    pub description: String,
    /// Expected to equal the sum of item amounts; checked by the balance
    /// check after assembly
    pub total_amount: BigDecimal,
    #[serde(default)]
    pub branch_id: Option<i64>,
    pub items: Vec<TransactionItem>,
}

/// Outcome of the account search for a single party name
///
/// At most one of `detail_code` and `general_account_id` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountResolution {
    pub detail_code: Option<String>,
    pub detail_type_id: Option<i64>,
    pub general_account_id: Option<i64>,
    /// Catalog title that matched, or the raw input name when nothing did
    pub matched_title: String,
}

impl AccountResolution {
    pub fn unresolved(display_name: impl Into<String>) -> Self {
        Self {
            detail_code: None,
            detail_type_id: None,
            general_account_id: None,
            matched_title: display_name.into(),
        }
    }

    pub fn detail(account: &DetailAccount) -> Self {
        Self {
            detail_code: Some(account.code.clone()),
            detail_type_id: Some(account.type_id),
            general_account_id: None,
            matched_title: account.title.clone(),
        }
    }

    pub fn general(account: &GeneralAccount) -> Self {
        Self {
            detail_code: None,
            detail_type_id: None,
            general_account_id: Some(account.id),
            matched_title: account.title.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.detail_code.is_some() || self.general_account_id.is_some()
    }
}

/// How a single statement item will be posted
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRouting {
    /// Bank service charge; posted to the fixed fee account
    Fee,
    /// Counterparty payment with the result of the account search
    Counterparty(AccountResolution),
}

/// Detail-level (subsidiary) account from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailAccount {
    pub code: String,
    pub type_id: i64,
    pub title: String,
}

/// General-level account from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralAccount {
    pub id: i64,
    pub code: String,
    pub title: String,
    /// Owning general-ledger (control) account
    pub ledger_account_id: i64,
}

/// General accounts that may never be picked as a counterparty
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountExclusions {
    pub account_ids: Vec<i64>,
    /// Display-code prefix of the cash/bank accounts; empty disables it
    pub code_prefix: String,
}

impl AccountExclusions {
    pub fn excludes(&self, account: &GeneralAccount) -> bool {
        self.account_ids.contains(&account.id)
            || (!self.code_prefix.is_empty() && account.code.starts_with(&self.code_prefix))
    }
}

/// Fully resolved posting target of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub general_account_id: i64,
    pub ledger_account_id: i64,
    pub account_group_id: i64,
    /// Display code of the general account
    pub code: String,
}

/// One debit-or-credit line within a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based, contiguous within the voucher
    pub row_number: u32,
    pub account: AccountRef,
    pub detail_code: Option<String>,
    pub detail_type_id: Option<i64>,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub memo: String,
}

impl LedgerEntry {
    /// Create an entry with `amount` on `side` and zero on the other side
    pub fn new(
        row_number: u32,
        account: AccountRef,
        side: EntrySide,
        amount: BigDecimal,
        memo: String,
    ) -> Self {
        let (debit, credit) = match side {
            EntrySide::Debit => (amount, BigDecimal::from(0)),
            EntrySide::Credit => (BigDecimal::from(0), amount),
        };
        Self {
            row_number,
            account,
            detail_code: None,
            detail_type_id: None,
            debit,
            credit,
            memo,
        }
    }

    pub fn with_detail(mut self, detail_code: Option<String>, detail_type_id: Option<i64>) -> Self {
        self.detail_code = detail_code;
        self.detail_type_id = detail_type_id;
        self
    }

    /// The side carrying the nonzero amount, or `None` if the entry is malformed
    pub fn side(&self) -> Option<EntrySide> {
        let zero = BigDecimal::from(0);
        match (self.debit != zero, self.credit != zero) {
            (true, false) => Some(EntrySide::Debit),
            (false, true) => Some(EntrySide::Credit),
            _ => None,
        }
    }

    pub fn amount(&self) -> &BigDecimal {
        match self.side() {
            Some(EntrySide::Credit) => &self.credit,
            _ => &self.debit,
        }
    }
}

/// Store-assigned voucher identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherId(pub i64);

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope within which `number` and `sequence` are allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberingScope {
    pub branch_id: i64,
    pub fiscal_year_id: i64,
    pub ledger_id: i64,
}

impl NumberingScope {
    /// Key of the numbering lock; `number` ignores the branch so the lock does too
    pub fn lock_key(&self) -> (i64, i64) {
        (self.fiscal_year_id, self.ledger_id)
    }
}

/// Current maximum values of the voucher counters within a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoucherCounters {
    /// Max `number` within fiscal year × ledger
    pub number: i64,
    /// Max `sequence` within branch × fiscal year × ledger
    pub sequence: i64,
    /// Max `daily_number` within branch × fiscal year × ledger × day
    pub daily_number: i64,
}

impl VoucherCounters {
    pub fn next(&self) -> VoucherCounters {
        VoucherCounters {
            number: self.number + 1,
            sequence: self.sequence + 1,
            daily_number: self.daily_number + 1,
        }
    }
}

/// Header metadata of a voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherHeader {
    pub branch_id: i64,
    pub fiscal_year_id: i64,
    pub ledger_id: i64,
    pub voucher_type_id: i64,
    pub number: i64,
    pub sequence: i64,
    pub daily_number: i64,
    pub date: NaiveDate,
    pub description: String,
}

impl VoucherHeader {
    pub fn scope(&self) -> NumberingScope {
        NumberingScope {
            branch_id: self.branch_id,
            fiscal_year_id: self.fiscal_year_id,
            ledger_id: self.ledger_id,
        }
    }
}

/// A balanced, not yet persisted voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub header: VoucherHeader,
    pub entries: Vec<LedgerEntry>,
}

impl Voucher {
    pub fn total_debits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.debit).sum()
    }

    pub fn total_credits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// Check the invariants every voucher must hold before it is committed
    pub fn validate(&self) -> LedgerResult<()> {
        if self.entries.len() < 2 {
            return Err(LedgerError::Validation(
                "Voucher must have at least two entries for double-entry bookkeeping".to_string(),
            ));
        }

        let zero = BigDecimal::from(0);
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.row_number as usize != index + 1 {
                return Err(LedgerError::Validation(format!(
                    "Row numbers must be contiguous from 1: found {} at position {}",
                    entry.row_number,
                    index + 1
                )));
            }
            if entry.debit < zero || entry.credit < zero {
                return Err(LedgerError::Validation(format!(
                    "Row {} has a negative amount",
                    entry.row_number
                )));
            }
            if entry.side().is_none() {
                return Err(LedgerError::Validation(format!(
                    "Row {} must have exactly one nonzero side",
                    entry.row_number
                )));
            }
        }

        if !self.is_balanced() {
            return Err(LedgerError::Validation(format!(
                "Voucher is not balanced: debits = {}, credits = {}",
                self.total_debits(),
                self.total_credits()
            )));
        }

        Ok(())
    }
}

/// Result handed back to the caller of a sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_id: Option<VoucherId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncResult {
    pub fn committed(voucher_id: VoucherId) -> Self {
        Self {
            success: true,
            voucher_id: Some(voucher_id),
            error_message: None,
        }
    }

    pub fn failure(error: &LedgerError) -> Self {
        Self {
            success: false,
            voucher_id: None,
            error_message: Some(error.message().to_string()),
        }
    }
}

/// Errors that can occur while synthesizing or committing a voucher
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// The account search itself failed; distinct from "no match"
    #[error("Account resolution failed: {0}")]
    ResolutionQuery(String),
    /// Header numbering collided with a concurrent writer
    #[error("Voucher numbering conflict: {0}")]
    AllocationConflict(String),
    /// The atomic write was rejected or rolled back
    #[error("Commit failed: {0}")]
    Commit(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl LedgerError {
    /// The underlying diagnostic, without the error-kind prefix
    pub fn message(&self) -> &str {
        match self {
            LedgerError::ResolutionQuery(msg)
            | LedgerError::AllocationConflict(msg)
            | LedgerError::Commit(msg)
            | LedgerError::Validation(msg)
            | LedgerError::AccountNotFound(msg)
            | LedgerError::Storage(msg)
            | LedgerError::Proxy(msg) => msg,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: i64) -> AccountRef {
        AccountRef {
            general_account_id: id,
            ledger_account_id: 10,
            account_group_id: 1,
            code: id.to_string(),
        }
    }

    fn header() -> VoucherHeader {
        VoucherHeader {
            branch_id: 1,
            fiscal_year_id: 1,
            ledger_id: 1,
            voucher_type_id: 1,
            number: 1,
            sequence: 1,
            daily_number: 1,
            date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_mode_sides_are_opposite() {
        assert_eq!(SyncMode::Deposit.counterparty_side(), EntrySide::Credit);
        assert_eq!(SyncMode::Deposit.bank_side(), EntrySide::Debit);
        assert_eq!(SyncMode::Withdrawal.counterparty_side(), EntrySide::Debit);
        assert_eq!(SyncMode::Withdrawal.bank_side(), EntrySide::Credit);
    }

    #[test]
    fn test_entry_places_amount_on_one_side() {
        let entry = LedgerEntry::new(
            1,
            account(1),
            EntrySide::Credit,
            BigDecimal::from(500),
            "memo".to_string(),
        );
        assert_eq!(entry.debit, BigDecimal::from(0));
        assert_eq!(entry.credit, BigDecimal::from(500));
        assert_eq!(entry.side(), Some(EntrySide::Credit));
        assert_eq!(entry.amount(), &BigDecimal::from(500));
    }

    #[test]
    fn test_voucher_validation_rejects_unbalanced() {
        let voucher = Voucher {
            header: header(),
            entries: vec![
                LedgerEntry::new(1, account(1), EntrySide::Debit, BigDecimal::from(100), String::new()),
                LedgerEntry::new(2, account(2), EntrySide::Credit, BigDecimal::from(90), String::new()),
            ],
        };
        assert!(matches!(voucher.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_voucher_validation_rejects_gapped_rows() {
        let voucher = Voucher {
            header: header(),
            entries: vec![
                LedgerEntry::new(1, account(1), EntrySide::Debit, BigDecimal::from(100), String::new()),
                LedgerEntry::new(3, account(2), EntrySide::Credit, BigDecimal::from(100), String::new()),
            ],
        };
        assert!(voucher.validate().is_err());
    }

    #[test]
    fn test_request_deserializes_original_field_names() {
        let json = r#"{
            "mode": "deposit",
            "date": "2024-03-20",
            "description": "batch",
            "totalAmount": "1000",
            "items": [{"partyName": "Acme", "amount": "1000", "desc": "invoice 7", "tracking": "TR-1"}]
        }"#;
        let request: SyncRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, SyncMode::Deposit);
        assert_eq!(request.branch_id, None);
        assert_eq!(request.items[0].description.as_deref(), Some("invoice 7"));
        assert_eq!(request.items[0].tracking_code.as_deref(), Some("TR-1"));
    }

    #[test]
    fn test_failure_result_carries_message_verbatim() {
        let err = LedgerError::Commit("proxy said no".to_string());
        let result = SyncResult::failure(&err);
        assert!(!result.success);
        assert_eq!(result.voucher_id, None);
        assert_eq!(result.error_message.as_deref(), Some("proxy said no"));
    }
}
