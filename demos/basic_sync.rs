//! Basic statement sync example
//!
//! Runs against an in-memory store, or against a live proxy when
//! `LEDGER_PROXY_URL` and `LEDGER_PROXY_KEY` are set.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use statement_voucher::utils::MemoryStore;
use statement_voucher::{
    HttpProxy, LedgerStore, ProxyLedgerStore, StatementSync, SyncMode, SyncRequest,
    TransactionItem,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🧾 Statement Voucher - Basic Sync Example\n");

    let request = SyncRequest {
        mode: SyncMode::Deposit,
        date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        description: "Tejarat statement, 15 June".to_string(),
        total_amount: BigDecimal::from(1_000_000),
        branch_id: None,
        items: vec![
            TransactionItem::new("Acme Trading", BigDecimal::from(700_000))
                .with_tracking_code("TRK-58812"),
            TransactionItem::new("بانک تجارت", BigDecimal::from(300_000))
                .with_description("کارمزد انتقال"),
        ],
    };

    if std::env::var("LEDGER_PROXY_URL").is_ok() {
        println!("🌐 Using the statement proxy\n");
        let store = ProxyLedgerStore::new(HttpProxy::from_env()?);
        run(StatementSync::new(store), &request).await?;
    } else {
        println!("💾 Using the in-memory store\n");
        run(StatementSync::new(demo_store()), &request).await?;
    }

    Ok(())
}

async fn run<S: LedgerStore + Clone + 'static>(
    sync: StatementSync<S>,
    request: &SyncRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("📋 Preview:");
    let voucher = sync.preview(request).await?;
    for entry in &voucher.entries {
        println!(
            "  {:>2}. {:<8} {:<8} Dr {:>10} Cr {:>10}  {}",
            entry.row_number,
            entry.account.code,
            entry.detail_code.as_deref().unwrap_or("-"),
            entry.debit,
            entry.credit,
            entry.memo
        );
    }
    println!(
        "  Balanced: {} (total {})\n",
        voucher.is_balanced(),
        voucher.total_debits()
    );

    let result = sync.sync(request).await;
    println!("✅ Result: {}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn demo_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .add_fiscal_year(1)
        .add_ledger_account(111, 1)
        .add_ledger_account(219, 2)
        .add_ledger_account(310, 3)
        .add_ledger_account(921, 9)
        .add_general_account(111003, "111003", "Cash Box", 111)
        .add_general_account(111005, "111005", "Tejarat Bank Current Account", 111)
        .add_general_account(11901, "11901", "Prepayments Paid", 111)
        .add_general_account(21901, "21901", "Prepayments Received", 219)
        .add_general_account(31001, "31001", "Trade Receivables", 310)
        .add_general_account(921145, "921145", "Bank Charges", 921)
        .add_detail_account("40001", 3, "Acme Trading Co")
        .relate_detail_type(3, 31001);
    store
}
