//! End-to-end statement sync: classify, resolve, assemble, commit

use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::ledger::{
    AccountResolver, AllocationLocks, FeeClassifier, TransactionExecutor, VoucherAssembler,
};
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::validate_request;

/// Main sync service that orchestrates one request from items to voucher id
pub struct StatementSync<S: LedgerStore + Clone + 'static> {
    resolver: AccountResolver<S>,
    classifier: FeeClassifier,
    assembler: VoucherAssembler<S>,
    executor: TransactionExecutor<S>,
    locks: AllocationLocks,
    audit: Arc<dyn AuditSink>,
}

impl<S: LedgerStore + Clone + 'static> StatementSync<S> {
    /// Create a sync service with the default configuration
    pub fn new(store: S) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    /// Create a sync service with a custom configuration
    pub fn with_config(store: S, config: SyncConfig) -> Self {
        Self {
            resolver: AccountResolver::with_config(store.clone(), config.clone()),
            classifier: FeeClassifier::new(config.fee_markers.clone()),
            assembler: VoucherAssembler::with_config(store.clone(), config),
            executor: TransactionExecutor::new(store),
            locks: AllocationLocks::new(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replace the audit sink
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Share numbering locks with other services writing to the same store
    pub fn with_locks(mut self, locks: AllocationLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &AllocationLocks {
        &self.locks
    }

    /// Run the full pipeline and fold the outcome into a caller-facing result
    pub async fn sync(&self, request: &SyncRequest) -> SyncResult {
        self.audit.record(
            AuditLevel::Info,
            "starting statement voucher sync",
            Some(json!({ "itemsCount": request.items.len(), "mode": request.mode })),
        );

        match self.sync_voucher(request).await {
            Ok(id) => {
                self.audit.record(
                    AuditLevel::Success,
                    "voucher created",
                    Some(json!({ "voucherId": id })),
                );
                SyncResult::committed(id)
            }
            Err(err) => {
                error!(error = %err, "statement sync failed");
                self.audit.record(
                    AuditLevel::Error,
                    "statement sync failed",
                    Some(json!({ "error": err.to_string() })),
                );
                SyncResult::failure(&err)
            }
        }
    }

    /// Run the full pipeline, returning the committed voucher id
    pub async fn sync_voucher(&self, request: &SyncRequest) -> LedgerResult<VoucherId> {
        let span = info_span!(
            "statement_sync",
            sync_id = %Uuid::new_v4(),
            mode = ?request.mode,
            items = request.items.len()
        );

        async {
            validate_request(request)?;
            let routings = self.route_items(request).await?;

            let scope = self.assembler.numbering_scope(request).await?;
            let _guard = self.locks.acquire(scope).await;

            let header = self.assembler.allocate_header(request, scope).await?;
            let voucher = self.assembler.assemble(request, &routings, header).await?;
            let id = self.executor.commit(voucher).await?;
            info!(voucher_id = %id, "statement synced");
            Ok(id)
        }
        .instrument(span)
        .await
    }

    /// Assemble the voucher without committing it
    pub async fn preview(&self, request: &SyncRequest) -> LedgerResult<Voucher> {
        validate_request(request)?;
        let routings = self.route_items(request).await?;
        let scope = self.assembler.numbering_scope(request).await?;
        let header = self.assembler.allocate_header(request, scope).await?;
        self.assembler.assemble(request, &routings, header).await
    }

    /// Route every item: fees skip the account search, the rest are resolved
    /// concurrently and returned in input order
    pub async fn route_items(&self, request: &SyncRequest) -> LedgerResult<Vec<ItemRouting>> {
        let mut routings: Vec<Option<ItemRouting>> = vec![None; request.items.len()];
        let mut lookups = JoinSet::new();

        for (index, item) in request.items.iter().enumerate() {
            if self
                .classifier
                .is_fee(&item.party_name, item.description.as_deref())
            {
                routings[index] = Some(ItemRouting::Fee);
                continue;
            }

            let resolver = self.resolver.clone();
            let party_name = item.party_name.clone();
            lookups.spawn(async move { (index, resolver.resolve(&party_name).await) });
        }

        while let Some(joined) = lookups.join_next().await {
            let (index, resolution) = joined.map_err(|e| {
                LedgerError::ResolutionQuery(format!("account lookup task failed: {e}"))
            })?;
            routings[index] = Some(ItemRouting::Counterparty(resolution?));
        }

        routings
            .into_iter()
            .enumerate()
            .map(|(index, routing)| {
                routing.ok_or_else(|| {
                    LedgerError::ResolutionQuery(format!("item {} was not routed", index + 1))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryStore;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Delays detail searches for one name and records completion order
    #[derive(Clone)]
    struct SlowStore {
        inner: MemoryStore,
        slow_token: String,
        completed: Arc<Mutex<Vec<String>>>,
    }

    impl SlowStore {
        fn new(inner: MemoryStore, slow_token: &str) -> Self {
            Self {
                inner,
                slow_token: slow_token.to_string(),
                completed: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn completed(&self) -> Vec<String> {
            self.completed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerStore for SlowStore {
        async fn find_detail_accounts(
            &self,
            pattern: &crate::ledger::NamePattern,
        ) -> LedgerResult<Vec<DetailAccount>> {
            if pattern.tokens().contains(&self.slow_token) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let found = self.inner.find_detail_accounts(pattern).await;
            self.completed.lock().unwrap().push(pattern.tokens().join(" "));
            found
        }

        async fn find_general_accounts(
            &self,
            pattern: &crate::ledger::NamePattern,
            exclusions: &AccountExclusions,
        ) -> LedgerResult<Vec<GeneralAccount>> {
            self.inner.find_general_accounts(pattern, exclusions).await
        }

        async fn account_by_code(&self, code: &str) -> LedgerResult<Option<AccountRef>> {
            self.inner.account_by_code(code).await
        }

        async fn account_by_id(&self, general_account_id: i64) -> LedgerResult<Option<AccountRef>> {
            self.inner.account_by_id(general_account_id).await
        }

        async fn last_posting_account(
            &self,
            detail_code: &str,
            side: EntrySide,
        ) -> LedgerResult<Option<i64>> {
            self.inner.last_posting_account(detail_code, side).await
        }

        async fn detail_type_account(&self, detail_type_id: i64) -> LedgerResult<Option<i64>> {
            self.inner.detail_type_account(detail_type_id).await
        }

        async fn latest_fiscal_year(&self) -> LedgerResult<Option<i64>> {
            self.inner.latest_fiscal_year().await
        }

        async fn voucher_counters(
            &self,
            scope: &NumberingScope,
            date: NaiveDate,
        ) -> LedgerResult<VoucherCounters> {
            self.inner.voucher_counters(scope, date).await
        }

        async fn commit_voucher(&self, voucher: &Voucher) -> LedgerResult<VoucherId> {
            self.inner.commit_voucher(voucher).await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(AuditLevel, String)>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, level: AuditLevel, message: &str, _data: Option<serde_json::Value>) {
            self.events.lock().unwrap().push((level, message.to_string()));
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .add_fiscal_year(1)
            .add_ledger_account(10, 1)
            .add_general_account(111003, "111003", "Cash Box", 10)
            .add_general_account(111005, "111005", "Bank Account", 10)
            .add_general_account(21901, "21901", "Prepayments Received", 10)
            .add_general_account(11901, "11901", "Prepayments Paid", 10)
            .add_general_account(921145, "921145", "Bank Charges", 10)
            .add_general_account(31001, "31001", "Customers", 10)
            .add_detail_account("40001", 3, "Acme Co")
            .add_detail_account("40002", 3, "کارمزد بانکی تجارت")
            .relate_detail_type(3, 31001);
        store
    }

    fn request(mode: SyncMode, items: Vec<TransactionItem>) -> SyncRequest {
        let total = items.iter().map(|i| &i.amount).sum();
        SyncRequest {
            mode,
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            description: "Daily statement".to_string(),
            total_amount: total,
            branch_id: None,
            items,
        }
    }

    #[tokio::test]
    async fn test_fee_items_skip_resolution() {
        let store = store();
        let sync = StatementSync::new(store.clone());
        let req = request(
            SyncMode::Deposit,
            vec![TransactionItem::new("کارمزد بانکی تجارت", BigDecimal::from(3))],
        );

        let routings = sync.route_items(&req).await.unwrap();
        assert_eq!(routings, vec![ItemRouting::Fee]);
        assert_eq!(store.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_routing_preserves_input_order() {
        let sync = StatementSync::new(store());
        let req = request(
            SyncMode::Deposit,
            vec![
                TransactionItem::new("Nobody", BigDecimal::from(1)),
                TransactionItem::new("x", BigDecimal::from(1)).with_description("کارمزد"),
                TransactionItem::new("Acme", BigDecimal::from(1)),
            ],
        );

        let routings = sync.route_items(&req).await.unwrap();
        assert!(matches!(&routings[0], ItemRouting::Counterparty(r) if !r.is_resolved()));
        assert_eq!(routings[1], ItemRouting::Fee);
        assert!(matches!(
            &routings[2],
            ItemRouting::Counterparty(r) if r.detail_code.as_deref() == Some("40001")
        ));
    }

    #[tokio::test]
    async fn test_slow_lookup_keeps_input_order() {
        let inner = store();
        inner.add_detail_account("40003", 3, "Zenith Traders");
        let slow = SlowStore::new(inner, "acme");
        let sync = StatementSync::new(slow.clone());
        let req = request(
            SyncMode::Deposit,
            vec![
                TransactionItem::new("Acme", BigDecimal::from(5)),
                TransactionItem::new("x", BigDecimal::from(1)).with_description("کارمزد"),
                TransactionItem::new("Zenith", BigDecimal::from(2)),
            ],
        );

        let routings = sync.route_items(&req).await.unwrap();
        assert_eq!(slow.completed(), vec!["zenith".to_string(), "acme".to_string()]);
        assert!(matches!(
            &routings[0],
            ItemRouting::Counterparty(r) if r.detail_code.as_deref() == Some("40001")
        ));
        assert_eq!(routings[1], ItemRouting::Fee);
        assert!(matches!(
            &routings[2],
            ItemRouting::Counterparty(r) if r.detail_code.as_deref() == Some("40003")
        ));

        let voucher = sync.preview(&req).await.unwrap();
        let rows: Vec<(u32, Option<&str>)> = voucher
            .entries
            .iter()
            .map(|e| (e.row_number, e.detail_code.as_deref()))
            .collect();
        assert_eq!(
            rows,
            vec![(1, Some("40001")), (2, None), (3, Some("40003")), (4, None)]
        );
    }

    #[tokio::test]
    async fn test_sync_records_audit_trail() {
        let sink = Arc::new(RecordingSink::default());
        let sync = StatementSync::new(store()).with_audit_sink(sink.clone());
        let req = request(SyncMode::Deposit, vec![TransactionItem::new("Acme", BigDecimal::from(8))]);

        let result = sync.sync(&req).await;
        assert!(result.success);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, AuditLevel::Info);
        assert_eq!(events[1].0, AuditLevel::Success);
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_without_default() {
        let store = store();
        store.fail_searches("timeout");
        let sync = StatementSync::new(store.clone());
        let req = request(SyncMode::Deposit, vec![TransactionItem::new("Acme", BigDecimal::from(8))]);

        let result = sync.sync(&req).await;
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("timeout"));
        assert!(store.vouchers().is_empty());
    }

    #[tokio::test]
    async fn test_preview_does_not_commit() {
        let store = store();
        let sync = StatementSync::new(store.clone());
        let req = request(SyncMode::Withdrawal, vec![TransactionItem::new("Acme", BigDecimal::from(8))]);

        let voucher = sync.preview(&req).await.unwrap();
        assert!(voucher.is_balanced());
        assert_eq!(voucher.header.number, 1);
        assert!(store.vouchers().is_empty());
    }
}
