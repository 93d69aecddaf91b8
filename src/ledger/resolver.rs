//! Tiered account search for statement party names

use tracing::debug;

use crate::config::SyncConfig;
use crate::ledger::normalize::{normalize, NamePattern, UNKNOWN_NAME};
use crate::traits::*;
use crate::types::*;

/// Resolves a party name to a detail account, a general account, or nothing
#[derive(Debug, Clone)]
pub struct AccountResolver<S: LedgerStore> {
    store: S,
    config: SyncConfig,
}

impl<S: LedgerStore> AccountResolver<S> {
    /// Create a resolver with default search settings
    pub fn new(store: S) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    pub fn with_config(store: S, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Resolve `party_name`, first match wins:
    /// detail catalog, then general catalog minus the cash/bank accounts,
    /// then unresolved. A failed search is an error, not a miss.
    pub async fn resolve(&self, party_name: &str) -> LedgerResult<AccountResolution> {
        let normalized = normalize(party_name);
        if normalized == UNKNOWN_NAME {
            return Ok(AccountResolution::unresolved(UNKNOWN_NAME));
        }

        // A name made only of wildcards would match every catalog row
        let pattern = NamePattern::from_normalized(&normalized);
        if pattern.is_empty() {
            debug!(party = party_name, "name has no searchable text");
            return Ok(AccountResolution::unresolved(party_name.trim()));
        }

        let candidates = self
            .store
            .find_detail_accounts(&pattern)
            .await
            .map_err(into_resolution_error)?;
        if let Some(account) = self.best_detail_match(&pattern, &candidates) {
            debug!(party = party_name, code = %account.code, "matched detail account");
            return Ok(AccountResolution::detail(account));
        }

        let exclusions = self.config.exclusions();
        let general = self
            .store
            .find_general_accounts(&pattern, &exclusions)
            .await
            .map_err(into_resolution_error)?;
        if let Some(account) = general
            .iter()
            .find(|account| !exclusions.excludes(account) && pattern.matches(&account.title))
        {
            debug!(party = party_name, account_id = account.id, "matched general account");
            return Ok(AccountResolution::general(account));
        }

        debug!(party = party_name, "no catalog match");
        Ok(AccountResolution::unresolved(party_name.trim()))
    }

    /// Score the first `detail_search_limit` candidates and keep the best;
    /// equal scores keep catalog order
    fn best_detail_match<'a>(
        &self,
        pattern: &NamePattern,
        candidates: &'a [DetailAccount],
    ) -> Option<&'a DetailAccount> {
        let mut best: Option<(u32, &DetailAccount)> = None;
        for account in candidates.iter().take(self.config.detail_search_limit) {
            let score = self.score(pattern, &account.title);
            if score == 0 {
                continue;
            }
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, account));
            }
        }
        best.map(|(_, account)| account)
    }

    fn score(&self, pattern: &NamePattern, title: &str) -> u32 {
        if pattern.matches(title) {
            self.config.match_score
        } else {
            0
        }
    }
}

fn into_resolution_error(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::ResolutionQuery(_) => err,
        other => LedgerError::ResolutionQuery(other.message().to_string()),
    }
}
