//! Application configuration
//!
//! Loaded from `~/.config/invoice-sync/config.toml`; every field has a
//! working default so the file is optional. The API token may also come
//! from the `INVOICE_SYNC_TOKEN` environment variable, which wins over
//! the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::resilience::RetryConfig;

pub const TOKEN_ENV: &str = "INVOICE_SYNC_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the remote invoice API.
    pub api_base_url: String,
    /// Bearer token for the remote API. Overridden by `INVOICE_SYNC_TOKEN`.
    pub api_token: String,
    pub database_path: PathBuf,
    /// Where error report workbooks are written.
    pub report_dir: PathBuf,
    /// Concurrent remote calls per phase.
    pub workers: usize,
    /// Leading columns included in the content hash.
    pub hash_columns: usize,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
            jitter: defaults.jitter,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invoice-sync")
}

impl Default for AppConfig {
    fn default() -> Self {
        let dir = app_dir();
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: String::new(),
            database_path: dir.join("invoice-sync.db"),
            report_dir: dir.join("reports"),
            workers: 3,
            hash_columns: crate::ingest::DEFAULT_HASH_COLUMNS,
            retry: RetrySettings::default(),
        }
    }
}

impl AppConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        app_dir().join("config.toml")
    }

    /// Load the config, falling back to defaults when the file does not
    /// exist. The environment token override is applied afterwards.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.api_token = token;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.hash_columns, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.api_token.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            api_base_url = "https://crm.example.com/api"
            workers = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://crm.example.com/api");
        assert_eq!(config.workers, 5);
        assert_eq!(config.hash_columns, 8);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_retry_settings_convert() {
        let settings = RetrySettings {
            max_attempts: 0,
            base_delay_ms: 250,
            max_delay_ms: 10_000,
            backoff_multiplier: 3.0,
            jitter: false,
        };
        let config = settings.to_retry_config();
        // Zero attempts clamps to one so a call always happens.
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(10));
    }
}
