//! Ledger store backed by a statement execution proxy
//!
//! Every read and the voucher write are expressed as parameterized
//! statements against the `FIN3` schema. Values always travel in
//! `Statement::params`; the statement text only ever depends on the number
//! of voucher rows.

pub mod http;

pub use http::HttpProxy;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::ledger::normalize::{escape_like, NamePattern, WILDCARD};
use crate::traits::*;
use crate::types::*;

/// Upper bound on catalog rows returned by one title search
pub const DEFAULT_ROW_LIMIT: i64 = 50;

const FIND_DETAIL_ACCOUNTS: &str = "SELECT TOP (@limit) Code, DLTypeRef, Title \
FROM [FIN3].[DL] \
WHERE LOWER(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(Title, N'ي', N'ی'), N'ك', N'ک'), N'ئ', N'ی'), N'آ', N'ا'), N'أ', N'ا')) LIKE @pattern;";

const FIND_GENERAL_ACCOUNTS: &str = "SELECT TOP (@limit) SL.SLID, SL.Code, SL.Title, SL.GLRef \
FROM [FIN3].[SL] SL \
WHERE LOWER(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(SL.Title, N'ي', N'ی'), N'ك', N'ک'), N'ئ', N'ی'), N'آ', N'ا'), N'أ', N'ا')) LIKE @pattern \
AND NOT EXISTS (SELECT 1 FROM STRING_SPLIT(@excludedIds, N',') x WHERE x.value = CAST(SL.SLID AS nvarchar(20))) \
AND (@excludedPrefix IS NULL OR SL.Code NOT LIKE @excludedPrefix);";

const ACCOUNT_BY_CODE: &str = "SELECT TOP 1 SL.SLID, SL.Code, SL.GLRef, GL.AccountGroupRef \
FROM [FIN3].[SL] SL LEFT JOIN [FIN3].[GL] GL ON GL.GLID = SL.GLRef \
WHERE SL.Code = @code;";

const ACCOUNT_BY_ID: &str = "SELECT TOP 1 SL.SLID, SL.Code, SL.GLRef, GL.AccountGroupRef \
FROM [FIN3].[SL] SL LEFT JOIN [FIN3].[GL] GL ON GL.GLID = SL.GLRef \
WHERE SL.SLID = @id;";

const LAST_DEBIT_ACCOUNT: &str = "SELECT TOP 1 SLRef FROM [FIN3].[VoucherItem] \
WHERE (DLLevel4 = @code OR DLLevel5 = @code) AND ISNULL(Debit, 0) > 0 \
ORDER BY VoucherItemID DESC;";

const LAST_CREDIT_ACCOUNT: &str = "SELECT TOP 1 SLRef FROM [FIN3].[VoucherItem] \
WHERE (DLLevel4 = @code OR DLLevel5 = @code) AND ISNULL(Credit, 0) > 0 \
ORDER BY VoucherItemID DESC;";

const DETAIL_TYPE_ACCOUNT: &str =
    "SELECT TOP 1 SLRef FROM [FIN3].[DLTypeRelation] WHERE DLTypeRef = @typeId;";

const LATEST_FISCAL_YEAR: &str =
    "SELECT TOP 1 FiscalYearID FROM [GNR3].[FiscalYear] ORDER BY FiscalYearID DESC;";

const VOUCHER_COUNTERS: &str = "SELECT \
(SELECT ISNULL(MAX(Number), 0) FROM [FIN3].[Voucher] \
WHERE LedgerRef = @ledgerId AND FiscalYearRef = @fiscalYearId) AS Number, \
(SELECT ISNULL(MAX(Sequence), 0) FROM [FIN3].[Voucher] \
WHERE BranchRef = @branchId AND FiscalYearRef = @fiscalYearId AND LedgerRef = @ledgerId) AS Sequence, \
(SELECT ISNULL(MAX(DailyNumber), 0) FROM [FIN3].[Voucher] \
WHERE BranchRef = @branchId AND FiscalYearRef = @fiscalYearId AND LedgerRef = @ledgerId \
AND CAST(Date AS DATE) = CAST(@date AS DATE)) AS DailyNumber;";

const NO_VOUCHER_ID: &str = "No voucher id returned";

/// Identifier column that the proxy may render as a number or a string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "IdRepr")]
struct RowId(i64);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

impl TryFrom<IdRepr> for RowId {
    type Error = String;

    fn try_from(repr: IdRepr) -> Result<Self, Self::Error> {
        match repr {
            IdRepr::Number(n) => Ok(RowId(n)),
            IdRepr::Text(s) => s
                .trim()
                .parse()
                .map(RowId)
                .map_err(|_| format!("invalid identifier {s:?}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailRow {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "DLTypeRef")]
    type_id: RowId,
    #[serde(rename = "Title")]
    title: String,
}

#[derive(Debug, Deserialize)]
struct GeneralRow {
    #[serde(rename = "SLID")]
    id: RowId,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "GLRef")]
    ledger_account_id: RowId,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    #[serde(rename = "SLID")]
    id: RowId,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "GLRef")]
    ledger_account_id: RowId,
    #[serde(rename = "AccountGroupRef")]
    account_group_id: Option<RowId>,
}

#[derive(Debug, Deserialize)]
struct CountersRow {
    #[serde(rename = "Number")]
    number: RowId,
    #[serde(rename = "Sequence")]
    sequence: RowId,
    #[serde(rename = "DailyNumber")]
    daily_number: RowId,
}

fn decode<T: DeserializeOwned>(row: Map<String, Value>) -> LedgerResult<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| LedgerError::Proxy(format!("Unexpected row shape: {e}")))
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Map<String, Value>>) -> LedgerResult<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

/// First column named `column` of the first row, if any
fn scalar_id(rows: Vec<Map<String, Value>>, column: &str) -> LedgerResult<Option<i64>> {
    let Some(mut row) = rows.into_iter().next() else {
        return Ok(None);
    };
    match row.remove(column) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value::<RowId>(value)
            .map(|id| Some(id.0))
            .map_err(|e| LedgerError::Proxy(format!("Unexpected {column} value: {e}"))),
    }
}

/// Classify a failed voucher write by the store's own message
fn commit_error(err: LedgerError) -> LedgerError {
    let message = err.message().to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("duplicate") || lowered.contains("unique") {
        LedgerError::AllocationConflict(message)
    } else {
        LedgerError::Commit(message)
    }
}

/// `LedgerStore` over a [`StatementProxy`]
pub struct ProxyLedgerStore<P: StatementProxy> {
    proxy: Arc<P>,
    row_limit: i64,
}

impl<P: StatementProxy> Clone for ProxyLedgerStore<P> {
    fn clone(&self) -> Self {
        Self {
            proxy: Arc::clone(&self.proxy),
            row_limit: self.row_limit,
        }
    }
}

impl<P: StatementProxy> ProxyLedgerStore<P> {
    pub fn new(proxy: P) -> Self {
        Self {
            proxy: Arc::new(proxy),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Cap the rows returned by one title search
    pub fn with_row_limit(mut self, row_limit: i64) -> Self {
        self.row_limit = row_limit.max(1);
        self
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }

    async fn account(&self, statement: Statement) -> LedgerResult<Option<AccountRef>> {
        let rows = self.proxy.execute(&statement).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let row: AccountRow = decode(row)?;
        let account_group_id = row.account_group_id.ok_or_else(|| {
            LedgerError::Storage(format!(
                "General ledger account {} has no account group",
                row.ledger_account_id.0
            ))
        })?;
        Ok(Some(AccountRef {
            general_account_id: row.id.0,
            ledger_account_id: row.ledger_account_id.0,
            account_group_id: account_group_id.0,
            code: row.code,
        }))
    }
}

/// Build the single all-or-nothing statement that writes `voucher`
pub fn commit_statement(voucher: &Voucher) -> Statement {
    let header = &voucher.header;
    let mut query = String::from(
        "SET NOCOUNT ON;\n\
DECLARE @VoucherID bigint, @ItemID bigint;\n\
BEGIN TRY\n\
    BEGIN TRANSACTION;\n\
    IF EXISTS (SELECT 1 FROM [FIN3].[Voucher] WITH (UPDLOCK, HOLDLOCK) \
WHERE LedgerRef = @ledgerId AND FiscalYearRef = @fiscalYearId AND Number = @number)\n\
        THROW 50001, N'Duplicate voucher number', 1;\n\
    EXEC [Sys3].[spGetNextId] 'FIN3.Voucher', @VoucherID OUTPUT, 1, 0;\n\
    INSERT INTO [FIN3].[Voucher]\n\
    (VoucherID, BranchRef, FiscalYearRef, LedgerRef, VoucherTypeRef, Number, Date, Description, State, IsTemporary, Creator, LastModifier, CreationDate, LastModificationDate, Sequence, DailyNumber, IsCurrencyBased, IsExternal, IsReadOnly, ShowCurrencyFields)\n\
    VALUES\n\
    (@VoucherID, @branchId, @fiscalYearId, @ledgerId, @voucherTypeId, @number, CAST(@date AS DATETIME), @description, 1, 0, 1, 1, GETDATE(), GETDATE(), @sequence, @dailyNumber, 0, 0, 0, 0);\n",
    );

    let mut statement = Statement::new(String::new())
        .bind("branchId", header.branch_id)
        .bind("fiscalYearId", header.fiscal_year_id)
        .bind("ledgerId", header.ledger_id)
        .bind("voucherTypeId", header.voucher_type_id)
        .bind("number", header.number)
        .bind("sequence", header.sequence)
        .bind("dailyNumber", header.daily_number)
        .bind("date", header.date.format("%Y-%m-%d").to_string())
        .bind("description", header.description.clone());

    for (index, entry) in voucher.entries.iter().enumerate() {
        let n = index + 1;
        // Writing to a String cannot fail.
        let _ = write!(
            query,
            "    EXEC [Sys3].[spGetNextId] 'FIN3.VoucherItem', @ItemID OUTPUT, 1, 0;\n\
    INSERT INTO [FIN3].[VoucherItem]\n\
    (VoucherItemID, VoucherRef, BranchRef, SLRef, GLRef, AccountGroupRef, SLCode, Debit, Credit, Description, RowNumber, IsCurrencyBased, DLLevel4, DLTypeRef4)\n\
    VALUES\n\
    (@ItemID, @VoucherID, @branchId, @sl{n}, @gl{n}, @ag{n}, @slCode{n}, @debit{n}, @credit{n}, @memo{n}, @row{n}, 0, @dl{n}, @dlType{n});\n"
        );

        statement.bind_mut(format!("sl{n}"), entry.account.general_account_id);
        statement.bind_mut(format!("gl{n}"), entry.account.ledger_account_id);
        statement.bind_mut(format!("ag{n}"), entry.account.account_group_id);
        statement.bind_mut(format!("slCode{n}"), entry.account.code.clone());
        statement.bind_mut(format!("debit{n}"), entry.debit.to_plain_string());
        statement.bind_mut(format!("credit{n}"), entry.credit.to_plain_string());
        statement.bind_mut(format!("memo{n}"), entry.memo.clone());
        statement.bind_mut(format!("row{n}"), entry.row_number);
        statement.bind_mut(format!("dl{n}"), entry.detail_code.clone());
        statement.bind_mut(format!("dlType{n}"), entry.detail_type_id);
    }

    query.push_str(
        "    COMMIT TRANSACTION;\n\
    SELECT @VoucherID AS NewDocId;\n\
END TRY\n\
BEGIN CATCH\n\
    IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION;\n\
    THROW;\n\
END CATCH;",
    );

    statement.query = query;
    statement
}

fn excluded_ids_param(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

fn excluded_prefix_param(prefix: &str) -> Option<String> {
    (!prefix.is_empty()).then(|| format!("{}{WILDCARD}", escape_like(prefix)))
}

#[async_trait]
impl<P: StatementProxy> LedgerStore for ProxyLedgerStore<P> {
    async fn find_detail_accounts(&self, pattern: &NamePattern) -> LedgerResult<Vec<DetailAccount>> {
        let statement = Statement::new(FIND_DETAIL_ACCOUNTS)
            .bind("limit", self.row_limit)
            .bind("pattern", pattern.to_like_operand());
        let rows: Vec<DetailRow> = decode_all(self.proxy.execute(&statement).await?)?;
        debug!(matches = rows.len(), "detail catalog searched");
        Ok(rows
            .into_iter()
            .map(|row| DetailAccount {
                code: row.code,
                type_id: row.type_id.0,
                title: row.title,
            })
            .collect())
    }

    async fn find_general_accounts(
        &self,
        pattern: &NamePattern,
        exclusions: &AccountExclusions,
    ) -> LedgerResult<Vec<GeneralAccount>> {
        // Exclusions are applied before TOP so they never use up the row limit
        let statement = Statement::new(FIND_GENERAL_ACCOUNTS)
            .bind("limit", self.row_limit)
            .bind("pattern", pattern.to_like_operand())
            .bind("excludedIds", excluded_ids_param(&exclusions.account_ids))
            .bind("excludedPrefix", excluded_prefix_param(&exclusions.code_prefix));
        let rows: Vec<GeneralRow> = decode_all(self.proxy.execute(&statement).await?)?;
        debug!(matches = rows.len(), "general catalog searched");
        Ok(rows
            .into_iter()
            .map(|row| GeneralAccount {
                id: row.id.0,
                code: row.code,
                title: row.title,
                ledger_account_id: row.ledger_account_id.0,
            })
            .collect())
    }

    async fn account_by_code(&self, code: &str) -> LedgerResult<Option<AccountRef>> {
        self.account(Statement::new(ACCOUNT_BY_CODE).bind("code", code))
            .await
    }

    async fn account_by_id(&self, general_account_id: i64) -> LedgerResult<Option<AccountRef>> {
        self.account(Statement::new(ACCOUNT_BY_ID).bind("id", general_account_id))
            .await
    }

    async fn last_posting_account(
        &self,
        detail_code: &str,
        side: EntrySide,
    ) -> LedgerResult<Option<i64>> {
        let query = match side {
            EntrySide::Debit => LAST_DEBIT_ACCOUNT,
            EntrySide::Credit => LAST_CREDIT_ACCOUNT,
        };
        let statement = Statement::new(query).bind("code", detail_code);
        scalar_id(self.proxy.execute(&statement).await?, "SLRef")
    }

    async fn detail_type_account(&self, detail_type_id: i64) -> LedgerResult<Option<i64>> {
        let statement = Statement::new(DETAIL_TYPE_ACCOUNT).bind("typeId", detail_type_id);
        scalar_id(self.proxy.execute(&statement).await?, "SLRef")
    }

    async fn latest_fiscal_year(&self) -> LedgerResult<Option<i64>> {
        let statement = Statement::new(LATEST_FISCAL_YEAR);
        scalar_id(self.proxy.execute(&statement).await?, "FiscalYearID")
    }

    async fn voucher_counters(
        &self,
        scope: &NumberingScope,
        date: NaiveDate,
    ) -> LedgerResult<VoucherCounters> {
        let statement = Statement::new(VOUCHER_COUNTERS)
            .bind("branchId", scope.branch_id)
            .bind("fiscalYearId", scope.fiscal_year_id)
            .bind("ledgerId", scope.ledger_id)
            .bind("date", date.format("%Y-%m-%d").to_string());

        let rows = self.proxy.execute(&statement).await?;
        match rows.into_iter().next() {
            Some(row) => {
                let row: CountersRow = decode(row)?;
                Ok(VoucherCounters {
                    number: row.number.0,
                    sequence: row.sequence.0,
                    daily_number: row.daily_number.0,
                })
            }
            None => Ok(VoucherCounters::default()),
        }
    }

    async fn commit_voucher(&self, voucher: &Voucher) -> LedgerResult<VoucherId> {
        let statement = commit_statement(voucher);
        let rows = self.proxy.execute(&statement).await.map_err(commit_error)?;
        let id = scalar_id(rows, "NewDocId").map_err(commit_error)?;
        id.map(VoucherId)
            .ok_or_else(|| LedgerError::Commit(NO_VOUCHER_ID.to_string()))
    }
}
