//! Traits for the external collaborators of the sync pipeline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ledger::normalize::NamePattern;
use crate::types::*;

/// The remote ledger store as seen by the sync pipeline
///
/// Reads are independent and may run concurrently. `commit_voucher` must be
/// all-or-nothing: either the header and every entry persist, or nothing does.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Detail accounts whose folded title matches `pattern`, in catalog order
    async fn find_detail_accounts(&self, pattern: &NamePattern) -> LedgerResult<Vec<DetailAccount>>;

    /// General accounts whose folded title matches `pattern`, in catalog
    /// order, leaving out `exclusions` before any row limit applies
    async fn find_general_accounts(
        &self,
        pattern: &NamePattern,
        exclusions: &AccountExclusions,
    ) -> LedgerResult<Vec<GeneralAccount>>;

    /// Posting target of the general account with the given display code
    async fn account_by_code(&self, code: &str) -> LedgerResult<Option<AccountRef>>;

    /// Posting target of the general account with the given id
    async fn account_by_id(&self, general_account_id: i64) -> LedgerResult<Option<AccountRef>>;

    /// General account of the most recent historical entry carrying
    /// `detail_code` with a nonzero amount on `side`
    async fn last_posting_account(
        &self,
        detail_code: &str,
        side: EntrySide,
    ) -> LedgerResult<Option<i64>>;

    /// General account related to a detail-account type
    async fn detail_type_account(&self, detail_type_id: i64) -> LedgerResult<Option<i64>>;

    /// Most recent fiscal year, by identifier
    async fn latest_fiscal_year(&self) -> LedgerResult<Option<i64>>;

    /// Current maximum counters for `scope`, the daily one restricted to `date`
    async fn voucher_counters(
        &self,
        scope: &NumberingScope,
        date: chrono::NaiveDate,
    ) -> LedgerResult<VoucherCounters>;

    /// Persist the voucher atomically and return its store-assigned id
    async fn commit_voucher(&self, voucher: &Voucher) -> LedgerResult<VoucherId>;
}

/// A single parameterized statement for the execution proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub query: String,
    pub params: Map<String, Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Map::new(),
        }
    }

    /// Bind a named parameter referenced as `@name` in the query
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn bind_mut(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(name.into(), value.into());
    }
}

/// Network-exposed statement executor in front of the relational store
#[async_trait]
pub trait StatementProxy: Send + Sync {
    /// Execute one statement body and return its result rows
    ///
    /// Errors carry the proxy's own message. Callers must not retry: a
    /// failed write may or may not have been applied.
    async fn execute(&self, statement: &Statement) -> LedgerResult<Vec<Map<String, Value>>>;
}

/// Severity of an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditLevel {
    Info,
    Success,
    Error,
}

/// Best-effort audit trail; never able to fail the caller
pub trait AuditSink: Send + Sync {
    fn record(&self, level: AuditLevel, message: &str, data: Option<Value>);
}

/// Audit sink writing to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, level: AuditLevel, message: &str, data: Option<Value>) {
        let data = data.map(|d| d.to_string()).unwrap_or_default();
        match level {
            AuditLevel::Info => tracing::info!(target: "audit", data = %data, "{message}"),
            AuditLevel::Success => tracing::info!(target: "audit", data = %data, success = true, "{message}"),
            AuditLevel::Error => tracing::error!(target: "audit", data = %data, "{message}"),
        }
    }
}
