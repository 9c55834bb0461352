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

use crate::client::ClientConfig;
use crate::retry::RetryPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_URL: &str = "SPANLENS_API_URL";
pub const ENV_API_KEY: &str = "SPANLENS_API_KEY";
pub const ENV_PROJECT_ID: &str = "SPANLENS_PROJECT_ID";
pub const ENV_TIMEOUT: &str = "SPANLENS_TIMEOUT";
pub const ENV_MAX_FILTERS: &str = "SPANLENS_MAX_FILTERS";

const MAX_TTL_SECS: u64 = 3600;

/// Spanlens Dashboard Configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API base URL (e.g., "http://localhost:8080")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent as `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Project used when a command does not name one
    #[serde(default)]
    pub project_id: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,

    #[serde(default = "default_detail_ttl")]
    pub detail_ttl_secs: u64,

    #[serde(default = "default_filter_options_ttl")]
    pub filter_options_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FiltersConfig {
    /// Maximum rows in the filter builder
    #[serde(default = "default_max_filters")]
    pub max_filters: usize,
}

// Default values
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_list_ttl() -> u64 {
    30
}

fn default_detail_ttl() -> u64 {
    60
}

fn default_filter_options_ttl() -> u64 {
    10
}

fn default_max_filters() -> usize {
    spanlens_core::DEFAULT_MAX_FILTERS
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            project_id: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl_secs: default_list_ttl(),
            detail_ttl_secs: default_detail_ttl(),
            filter_options_ttl_secs: default_filter_options_ttl(),
        }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            max_filters: default_max_filters(),
        }
    }
}

impl DashboardConfig {
    /// `<config dir>/spanlens/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("spanlens").join("config.toml"))
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - SPANLENS_API_URL: API base URL (default: http://localhost:8080)
    /// - SPANLENS_API_KEY: API key
    /// - SPANLENS_PROJECT_ID: Default project
    /// - SPANLENS_TIMEOUT: Request timeout in seconds (default: 30)
    /// - SPANLENS_MAX_FILTERS: Filter builder limit (default: 20)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_API_URL) {
            config.api.base_url = url;
        }

        if let Ok(key) = std::env::var(ENV_API_KEY) {
            config.api.api_key = Some(key);
        }

        if let Ok(project) = std::env::var(ENV_PROJECT_ID) {
            config.api.project_id = Some(project);
        }

        if let Ok(timeout) = std::env::var(ENV_TIMEOUT) {
            if let Ok(val) = timeout.parse() {
                config.api.timeout_secs = val;
            }
        }

        if let Ok(max) = std::env::var(ENV_MAX_FILTERS) {
            if let Ok(val) = max.parse() {
                config.filters.max_filters = val;
            }
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    ///
    /// Without an explicit path the default location is used when present.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let path = config_file.or_else(|| Self::default_path().filter(|p| p.exists()));
        let config = if let Some(path) = path {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::from_env()
            }
        } else {
            Self::from_env()
        };

        Ok(Self::merge_with_env(config))
    }

    /// Fill settings the file left unset from the environment
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        if config.api.api_key.is_none() {
            config.api.api_key = env_config.api.api_key;
        }
        if config.api.project_id.is_none() {
            config.api.project_id = env_config.api.project_id;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API URL must use http or https: {}", self.api.base_url);
        }

        if self.api.timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than zero");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("Retry max_attempts must be at least 1");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!("Retry initial_delay_ms cannot exceed max_delay_ms");
        }

        if self.cache.list_ttl_secs > MAX_TTL_SECS || self.cache.detail_ttl_secs > MAX_TTL_SECS {
            anyhow::bail!("Cache TTLs cannot exceed {} seconds", MAX_TTL_SECS);
        }

        if self.filters.max_filters == 0 {
            anyhow::bail!("max_filters must be at least 1");
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential()
            .with_max_attempts(self.retry.max_attempts)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.api.base_url.clone())
            .with_timeout(Duration::from_secs(self.api.timeout_secs))
            .with_retry(self.retry_policy())
            .with_list_ttl(Duration::from_secs(self.cache.list_ttl_secs))
            .with_detail_ttl(Duration::from_secs(self.cache.detail_ttl_secs))
            .with_filter_options_ttl(Duration::from_secs(self.cache.filter_options_ttl_secs));
        if let Some(key) = &self.api.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(project) = &self.api.project_id {
            config = config.with_project_id(project.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.cache.list_ttl_secs, 30);
        assert_eq!(config.cache.detail_ttl_secs, 60);
        assert_eq!(config.filters.max_filters, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://api.example.com\"\nproject_id = \"proj-9\"\n\n[cache]\nlist_ttl_secs = 5"
        )
        .unwrap();

        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.project_id.as_deref(), Some("proj-9"));
        assert_eq!(config.cache.list_ttl_secs, 5);
        assert_eq!(config.cache.detail_ttl_secs, 60);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_from_env_and_missing_file() {
        std::env::set_var(ENV_API_URL, "http://10.0.0.5:9000");
        std::env::set_var(ENV_TIMEOUT, "12");
        std::env::set_var(ENV_MAX_FILTERS, "not-a-number");

        let config = DashboardConfig::from_env();
        assert_eq!(config.api.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.api.timeout_secs, 12);
        assert_eq!(config.filters.max_filters, 20);

        let missing = DashboardConfig::load(Some(PathBuf::from("/nonexistent/spanlens.toml"))).unwrap();
        assert_eq!(missing.api.base_url, "http://10.0.0.5:9000");

        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_TIMEOUT);
        std::env::remove_var(ENV_MAX_FILTERS);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DashboardConfig::default();
        config.api.base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.retry.initial_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_config_mapping() {
        let mut config = DashboardConfig::default();
        config.api.api_key = Some("sk-test".into());
        config.retry.max_attempts = 5;

        let client = config.client_config();
        assert_eq!(client.api_key.as_deref(), Some("sk-test"));
        assert_eq!(client.retry.max_attempts, 5);
        assert_eq!(client.list_ttl, Duration::from_secs(30));
    }
}
