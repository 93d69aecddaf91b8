//! # Statement Voucher
//!
//! Turns bank-statement line items into balanced double-entry vouchers and
//! commits them to a remote ledger store.
//!
//! ## Features
//!
//! - **Name matching**: Folds Persian/Arabic spellings and matches party names against account titles
//! - **Account resolution**: Detail accounts first, general accounts second, defaults last
//! - **Fee routing**: Bank charges go straight to the fee account
//! - **Voucher assembly**: One counterparty row per item plus a single bank row
//! - **Atomic commit**: Header and entries land together or not at all
//! - **Storage abstraction**: Store-agnostic design with trait-based storage and an HTTP statement proxy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statement_voucher::{StatementSync, SyncMode, SyncRequest, TransactionItem};
//! use statement_voucher::utils::MemoryStore;
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! # async fn run() {
//! let store = MemoryStore::new();
//! let sync = StatementSync::new(store);
//! let request = SyncRequest {
//!     mode: SyncMode::Deposit,
//!     date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
//!     description: "Statement 1403/01".to_string(),
//!     total_amount: BigDecimal::from(1000),
//!     branch_id: None,
//!     items: vec![TransactionItem::new("Acme", BigDecimal::from(1000))],
//! };
//! let result = sync.sync(&request).await;
//! println!("{:?}", result);
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod proxy;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use ledger::*;
pub use proxy::*;
pub use traits::*;
pub use types::*;
