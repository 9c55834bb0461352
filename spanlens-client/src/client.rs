// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Spanlens Client
//!
//! Async client for the dashboard REST API. Reads go through a TTL cache
//! and are retried on transient failures; writes are sent once and
//! invalidate the cache entries they affect.

use crate::error::{extract_api_message, ClientError, Result};
use crate::retry::RetryPolicy;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use spanlens_core::{CacheSnapshot, CacheStats, Clock, Envelope, SystemClock, TtlCache};
use std::sync::Arc;
use std::time::Duration;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Spanlens client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API server
    pub base_url: String,
    pub api_key: Option<String>,
    /// Default project for project-scoped calls
    pub project_id: Option<String>,
    /// Request timeout (default: 30 seconds)
    pub timeout: Duration,
    /// Applied to GET requests only
    pub retry: RetryPolicy,
    pub list_ttl: Duration,
    pub detail_ttl: Duration,
    pub filter_options_ttl: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            project_id: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::exponential(),
            list_ttl: Duration::from_secs(30),
            detail_ttl: Duration::from_secs(60),
            filter_options_ttl: Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    pub fn with_detail_ttl(mut self, ttl: Duration) -> Self {
        self.detail_ttl = ttl;
        self
    }

    pub fn with_filter_options_ttl(mut self, ttl: Duration) -> Self {
        self.filter_options_ttl = ttl;
        self
    }
}

/// Spanlens API client.
///
/// # Example
///
/// ```no_run
/// use spanlens_client::{ClientConfig, SpanlensClient};
/// use spanlens_core::{to_api_params, TableKind, TableState};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SpanlensClient::new(
///         ClientConfig::new("http://localhost:8080").with_api_key("sk-..."),
///     )?;
///
///     let spec = TableKind::Traces.spec();
///     let state = TableState::from_query_string("filters=total_cost:>:0.01", spec);
///     let page = client.list_traces(&to_api_params(&state, spec)?).await?;
///     println!("{} traces", page.pagination.total);
///     Ok(())
/// }
/// ```
pub struct SpanlensClient {
    config: ClientConfig,
    http_client: HttpClient,
    cache: TtlCache<Value>,
}

impl SpanlensClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Client whose cache expiry follows `clock`.
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let url = url::Url::parse(&config.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL '{}': {}", config.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(16)
            .build()?;

        Ok(Self {
            config,
            http_client,
            cache: TtlCache::with_clock(clock),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Configured default project, or a configuration error.
    pub fn default_project(&self) -> Result<&str> {
        self.config
            .project_id
            .as_deref()
            .ok_or_else(|| ClientError::Config("no project id configured".to_string()))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub(crate) fn cache(&self) -> &TtlCache<Value> {
        &self.cache
    }

    /// Make one HTTP request. Empty success bodies decode as `null`.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        let mut request = self
            .http_client
            .request(method, &url)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_api_message(&text, status);
            if status == StatusCode::NOT_FOUND {
                return Err(ClientError::NotFound(message));
            }
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Make a request, retrying GETs per the configured policy.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let attempts = if method == Method::GET {
            self.config.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let value = self.send(method, path, query, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Unwrap a `{ "data": T }` response.
    pub(crate) async fn request_data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let envelope: Envelope<T> = self.request(method, path, &[], body).await?;
        Ok(envelope.data)
    }

    /// GET through the cache. The raw body is cached under `key`.
    pub(crate) async fn get_cached<T: DeserializeOwned>(
        &self,
        key: String,
        ttl: Duration,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        if let Some(value) = self.cache.get(&key) {
            return Ok(serde_json::from_value(value)?);
        }
        let value = self.send(Method::GET, path, query, None).await?;
        let parsed = serde_json::from_value(value.clone())?;
        self.cache.insert(key, value, ttl);
        Ok(parsed)
    }

    /// Cached GET of a `{ "data": T }` response.
    pub(crate) async fn get_cached_data<T: DeserializeOwned>(
        &self,
        key: String,
        ttl: Duration,
        path: &str,
    ) -> Result<T> {
        let envelope: Envelope<T> = self.get_cached(key, ttl, path, &[]).await?;
        Ok(envelope.data)
    }

    /// Await `mutation` after an optimistic cache edit, undoing the edit if
    /// it fails. `invalidate` prefixes are dropped on success.
    pub(crate) async fn optimistic<T, Fut>(
        &self,
        action: &'static str,
        snapshot: CacheSnapshot<Value>,
        invalidate: &[String],
        mutation: Fut,
    ) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        match mutation.await {
            Ok(value) => {
                self.invalidate(invalidate);
                tracing::info!(action, "Mutation succeeded");
                Ok(value)
            }
            Err(e) => {
                let restored = self.cache.rollback(snapshot);
                tracing::error!(action, restored, message = %e.user_message(), "Mutation failed, rolled back");
                Err(e)
            }
        }
    }

    /// Drop every cache entry under each prefix.
    pub(crate) fn invalidate(&self, prefixes: &[String]) {
        for prefix in prefixes {
            self.cache.invalidate_prefix(prefix);
        }
    }
}

impl std::fmt::Debug for SpanlensClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanlensClient")
            .field("base_url", &self.config.base_url)
            .field("project_id", &self.config.project_id)
            .finish()
    }
}

/// Rows of a cached list envelope (`data` array), or a single cached
/// resource (`data` object), whose `id_field` equals `id`.
fn matching_rows<'a>(cached: &'a mut Value, id_field: &str, id: &str) -> Vec<&'a mut Value> {
    match cached.get_mut("data") {
        Some(Value::Array(rows)) => rows
            .iter_mut()
            .filter(|row| row.get(id_field).and_then(Value::as_str) == Some(id))
            .collect(),
        Some(row @ Value::Object(_)) if row.get(id_field).and_then(Value::as_str) == Some(id) => {
            vec![row]
        }
        _ => Vec::new(),
    }
}

/// Set `field` on every cached copy of the row.
pub(crate) fn patch_row(cached: &mut Value, id_field: &str, id: &str, field: &str, value: Value) {
    for row in matching_rows(cached, id_field, id) {
        if let Some(object) = row.as_object_mut() {
            object.insert(field.to_string(), value.clone());
        }
    }
}

/// Remove the row from a cached list and adjust its pagination total.
pub(crate) fn remove_row(cached: &mut Value, id_field: &str, id: &str) {
    let removed = match cached.get_mut("data") {
        Some(Value::Array(rows)) => {
            let before = rows.len();
            rows.retain(|row| row.get(id_field).and_then(Value::as_str) != Some(id));
            before - rows.len()
        }
        _ => 0,
    };
    if removed == 0 {
        return;
    }
    if let Some(total) = cached.pointer_mut("/pagination/total") {
        if let Some(n) = total.as_u64() {
            *total = Value::from(n.saturating_sub(removed as u64));
        }
    }
}
