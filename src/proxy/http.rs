//! HTTP transport for the statement execution proxy

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::traits::{Statement, StatementProxy};
use crate::types::*;

/// Header carrying the shared proxy key
pub const PROXY_KEY_HEADER: &str = "x-proxy-key";

const BODY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    recordset: Option<Vec<Map<String, Value>>>,
    error: Option<String>,
    message: Option<String>,
}

/// Posts each statement as JSON to the proxy endpoint
///
/// Requests are sent once. A timed-out write may still have been applied by
/// the store, so nothing here retries.
#[derive(Debug, Clone)]
pub struct HttpProxy {
    client: reqwest::Client,
    url: String,
    key: String,
}

impl HttpProxy {
    pub fn new(config: &ProxyConfig) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Proxy(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            key: config.key.clone(),
        })
    }

    /// Build from `LEDGER_PROXY_*` environment variables
    pub fn from_env() -> LedgerResult<Self> {
        Self::new(&ProxyConfig::from_env()?)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Interpret a proxy response body
///
/// A body that is not JSON yields an error quoting its first 100 characters.
/// A non-2xx status or `success: false` yields the proxy's `error` text,
/// falling back to `message`.
pub fn parse_response(status_ok: bool, body: &str) -> LedgerResult<Vec<Map<String, Value>>> {
    let response: ProxyResponse = serde_json::from_str(body).map_err(|_| {
        let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        LedgerError::Proxy(format!("Proxy JSON Error: {preview}"))
    })?;

    if !status_ok || !response.success {
        let message = response
            .error
            .or(response.message)
            .unwrap_or_else(|| "Proxy reported failure without a message".to_string());
        return Err(LedgerError::Proxy(message));
    }

    Ok(response.recordset.unwrap_or_default())
}

#[async_trait]
impl StatementProxy for HttpProxy {
    async fn execute(&self, statement: &Statement) -> LedgerResult<Vec<Map<String, Value>>> {
        let response = self
            .client
            .post(&self.url)
            .header(PROXY_KEY_HEADER, &self.key)
            .json(statement)
            .send()
            .await
            .map_err(|e| LedgerError::Proxy(format!("Proxy request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::Proxy(format!("Proxy response unreadable: {e}")))?;

        let rows = parse_response(status.is_success(), &body);
        match &rows {
            Ok(rows) => debug!(status = status.as_u16(), rows = rows.len(), "proxy statement executed"),
            Err(err) => warn!(status = status.as_u16(), error = %err, "proxy statement failed"),
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_success_returns_recordset() {
        let rows = parse_response(true, r#"{"success":true,"recordset":[{"NewDocId":5}]}"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["NewDocId"], 5);
    }

    #[test]
    fn test_missing_recordset_is_empty() {
        let rows = parse_response(true, r#"{"success":true}"#).unwrap();
        assert!(rows.is_empty());

        let rows = parse_response(true, r#"{"success":true,"recordset":null}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_failure_prefers_error_over_message() {
        let err = parse_response(true, r#"{"success":false,"error":"Invalid column","message":"x"}"#)
            .unwrap_err();
        assert_eq!(err, LedgerError::Proxy("Invalid column".to_string()));

        let err = parse_response(true, r#"{"success":false,"message":"Login failed"}"#).unwrap_err();
        assert_eq!(err.message(), "Login failed");
    }

    #[test]
    fn test_http_error_status_fails_even_with_success_flag() {
        let err = parse_response(false, r#"{"success":true,"error":"Unauthorized"}"#).unwrap_err();
        assert_eq!(err.message(), "Unauthorized");
    }

    #[test]
    fn test_non_json_body_is_quoted() {
        let body = format!("<html>{}</html>", "x".repeat(300));
        let err = parse_response(true, &body).unwrap_err();
        let expected: String = body.chars().take(100).collect();
        assert_eq!(err.message(), format!("Proxy JSON Error: {expected}"));
    }

    #[test]
    fn test_client_builds_from_config() {
        let mut config = ProxyConfig::new("http://127.0.0.1:9/sql", "secret");
        config.timeout = Duration::from_secs(2);
        let proxy = HttpProxy::new(&config).unwrap();
        assert_eq!(proxy.url(), "http://127.0.0.1:9/sql");
    }
}
