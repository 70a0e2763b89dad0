//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, the last used email, where tokens are kept and
//! the timeout/retry knobs of the session layer.
//!
//! Configuration is stored at `~/.config/tarotnautica/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "tarotnautica";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "TAROTNAUTICA_API_URL";

const DEFAULT_API_URL: &str = "https://api.tarotnautica.app";

/// Authenticated requests are aborted after 30 seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Refresh calls are aborted after 10 seconds.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

/// 3 retries (4 attempts) before a refresh is considered failed.
const DEFAULT_MAX_REFRESH_RETRIES: u32 = 3;

/// Retry k waits k times this delay.
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Consecutive failures that trip the session circuit breaker.
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Idle period after which old failures stop counting.
const DEFAULT_FAILURE_RESET_WINDOW_SECS: u64 = 5 * 60;

/// A refresh younger than this is considered fresh.
const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 5 * 60;

/// Where the access/refresh pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenStorage {
    #[default]
    Keyring,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub last_email: Option<String>,
    pub token_storage: TokenStorage,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub max_refresh_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_consecutive_failures: u32,
    pub failure_reset_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            last_email: None,
            token_storage: TokenStorage::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            max_refresh_retries: DEFAULT_MAX_REFRESH_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            failure_reset_window_secs: DEFAULT_FAILURE_RESET_WINDOW_SECS,
        }
    }
}

impl Config {
    /// Load the config file (defaults if missing), then apply the
    /// `TAROTNAUTICA_API_URL` override.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = url;
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// The API base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn policy(&self) -> AuthPolicy {
        AuthPolicy {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            refresh_timeout: Duration::from_secs(self.refresh_timeout_secs),
            max_refresh_retries: self.max_refresh_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_consecutive_failures: self.max_consecutive_failures,
            failure_reset_window: Duration::from_secs(self.failure_reset_window_secs),
            refresh_threshold: Duration::from_secs(DEFAULT_REFRESH_THRESHOLD_SECS),
        }
    }
}

/// Timeouts, retry budget and breaker thresholds of the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    pub max_refresh_retries: u32,
    pub retry_base_delay: Duration,
    pub max_consecutive_failures: u32,
    pub failure_reset_window: Duration,
    pub refresh_threshold: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Config::default().policy()
    }
}

impl AuthPolicy {
    /// Delay before retry number `attempt` (1-based): `attempt × base`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

// ============================================================================
// Tests
// ============================================================================
