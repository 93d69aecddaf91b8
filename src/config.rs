//! Runtime configuration for the sync pipeline and the execution proxy

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::fee::FEE_MARKER;
use crate::types::*;

const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;

/// Account codes, scope defaults and search tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub default_branch_id: i64,
    pub default_ledger_id: i64,
    pub voucher_type_id: i64,
    /// General account receiving the aggregate bank entry
    pub bank_account_id: i64,
    /// Code of the "bank charges" general account
    pub fee_account_code: String,
    /// Default counterparty account code when a deposit item is unresolved
    pub deposit_default_code: String,
    /// Default counterparty account code when a withdrawal item is unresolved
    pub withdrawal_default_code: String,
    /// Used when even the mode default code is missing from the catalog
    pub last_resort_account_id: i64,
    /// General accounts that may never be picked as a counterparty
    pub excluded_account_ids: Vec<i64>,
    /// Code prefix of the cash/bank accounts
    pub excluded_code_prefix: String,
    pub fee_markers: Vec<String>,
    /// Bounded top-K of the detail-level search
    pub detail_search_limit: usize,
    /// Score of a containment match
    pub match_score: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_branch_id: 1,
            default_ledger_id: 1,
            voucher_type_id: 1,
            bank_account_id: 111005,
            fee_account_code: "921145".to_string(),
            deposit_default_code: "21901".to_string(),
            withdrawal_default_code: "11901".to_string(),
            last_resort_account_id: 111003,
            excluded_account_ids: vec![111003, 111005],
            excluded_code_prefix: "111".to_string(),
            fee_markers: vec![FEE_MARKER.to_string()],
            detail_search_limit: 5,
            match_score: 60,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> LedgerResult<Self> {
        let config: SyncConfig = serde_json::from_str(json)
            .map_err(|e| LedgerError::Validation(format!("Invalid sync configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.detail_search_limit == 0 {
            return Err(LedgerError::Validation(
                "detail_search_limit must be at least 1".to_string(),
            ));
        }
        if self.fee_account_code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "fee_account_code cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Default counterparty account code for a mode
    pub fn default_code(&self, mode: SyncMode) -> &str {
        match mode {
            SyncMode::Deposit => &self.deposit_default_code,
            SyncMode::Withdrawal => &self.withdrawal_default_code,
        }
    }

    /// Accounts the general-tier search must never return
    pub fn exclusions(&self) -> AccountExclusions {
        AccountExclusions {
            account_ids: self.excluded_account_ids.clone(),
            code_prefix: self.excluded_code_prefix.clone(),
        }
    }
}

/// Location and credentials of the statement execution proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    pub key: String,
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PROXY_TIMEOUT_SECS)
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            timeout: default_timeout(),
        }
    }

    /// Read `LEDGER_PROXY_URL`, `LEDGER_PROXY_KEY` and `LEDGER_PROXY_TIMEOUT_SECS`
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LedgerResult<Self> {
        let url = lookup("LEDGER_PROXY_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LedgerError::Validation("LEDGER_PROXY_URL is not set".to_string()))?;
        let key = lookup("LEDGER_PROXY_KEY")
            .ok_or_else(|| LedgerError::Validation("LEDGER_PROXY_KEY is not set".to_string()))?;
        let timeout = match lookup("LEDGER_PROXY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                LedgerError::Validation(format!("Invalid LEDGER_PROXY_TIMEOUT_SECS: {raw}"))
            })?),
            None => default_timeout(),
        };
        Ok(Self { url, key, timeout })
    }
}
