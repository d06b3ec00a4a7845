//! REST client for the cloud row store.
//!
//! Speaks the service's row API: `GET/POST/PATCH/DELETE {base}/rest/v1/{table}`
//! with query-encoded filters and JSON row bodies.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockbook_core::errors::RemoteStoreError;
use stockbook_core::store::{Filter, RemoteStore};

use crate::error::{ConnectError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

const API_URL_ENV: &str = "STOCKBOOK_API_URL";
const API_KEY_ENV: &str = "STOCKBOOK_API_KEY";

/// Connection settings for the cloud row store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ConnectConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Reads the connection settings from the environment.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(API_URL_ENV)
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ConnectError::config(format!(
                    "{API_URL_ENV} not configured. Cloud store operations are disabled."
                ))
            })?;
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(Self {
            base_url,
            api_key,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        })
    }
}

/// Client for the cloud row store REST API.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(config: ConnectConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let key_value = HeaderValue::from_str(api_key)
                .map_err(|_| ConnectError::config("API key contains invalid characters"))?;
            headers.insert("apikey", key_value);
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| ConnectError::config("API key contains invalid characters"))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn filter_params(filter: &Filter) -> Vec<(String, String)> {
        match filter {
            Filter::All => Vec::new(),
            Filter::Id(value) => vec![("id".to_string(), format!("eq.{}", literal(value)))],
            Filter::Eq(column, value) => {
                vec![(column.clone(), format!("eq.{}", literal(value)))]
            }
        }
    }

    /// Mutations must be row-targeted; a missing filter would touch the whole
    /// table.
    fn require_filtered(filter: &Filter, operation: &str) -> Result<()> {
        if matches!(filter, Filter::All) {
            return Err(ConnectError::invalid_request(format!(
                "refusing unfiltered {operation}"
            )));
        }
        Ok(())
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
            debug!("API error response ({}): {}", status, preview);
            return Err(ConnectError::api(status.as_u16(), preview));
        }
        Ok(response.json::<Vec<Value>>().await?)
    }

    pub async fn select_rows(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut params = Self::filter_params(filter);
        params.push(("select".to_string(), "*".to_string()));
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let response = self
            .client
            .get(self.table_url(table))
            .query(&params)
            .send()
            .await?;
        Self::read_rows(response).await
    }

    pub async fn insert_rows(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::read_rows(response).await
    }

    pub async fn update_rows(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> Result<Vec<Value>> {
        Self::require_filtered(filter, "update")?;
        let response = self
            .client
            .patch(self.table_url(table))
            .query(&Self::filter_params(filter))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::read_rows(response).await
    }

    pub async fn delete_rows(&self, table: &str, filter: &Filter) -> Result<()> {
        Self::require_filtered(filter, "delete")?;
        let response = self
            .client
            .delete(self.table_url(table))
            .query(&Self::filter_params(filter))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(MAX_LOG_BODY_CHARS).collect();
            return Err(ConnectError::api(status.as_u16(), preview));
        }
        Ok(())
    }
}

/// Filter literal form of a JSON value: strings unquoted, scalars as-is.
fn literal(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError> {
        self.select_rows(table, filter, limit)
            .await
            .map_err(Into::into)
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError> {
        self.insert_rows(table, rows).await.map_err(Into::into)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
    ) -> std::result::Result<Vec<Value>, RemoteStoreError> {
        self.update_rows(table, filter, patch)
            .await
            .map_err(Into::into)
    }

    async fn delete(
        &self,
        table: &str,
        filter: &Filter,
    ) -> std::result::Result<(), RemoteStoreError> {
        self.delete_rows(table, filter).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_literals_are_unquoted_for_strings() {
        assert_eq!(literal(&json!("abc")), "abc");
        assert_eq!(literal(&json!(42)), "42");
        assert_eq!(literal(&json!(true)), "true");
    }

    #[test]
    fn id_filter_becomes_eq_param() {
        let params = HttpRemoteStore::filter_params(&Filter::id(7));
        assert_eq!(params, vec![("id".to_string(), "eq.7".to_string())]);
    }

    #[test]
    fn unfiltered_mutations_are_refused() {
        assert!(HttpRemoteStore::require_filtered(&Filter::All, "delete").is_err());
        assert!(HttpRemoteStore::require_filtered(&Filter::id(1), "delete").is_ok());
    }
}
