//! Application configuration module
//!
//! Sync settings shared by the client replica manager and the tests that
//! drive it. The server reads its own settings in `backend::server::config`.

use std::time::Duration;
use thiserror::Error;

/// Default debounce window for batching outgoing local deltas
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server URL
    pub server_url: Option<String>,
    /// Debounce window before the pending queue is flushed
    pub debounce: Duration,
    /// Reconnect automatically after a transport failure
    pub auto_reconnect: bool,
    /// First reconnect delay
    pub reconnect_base: Duration,
    /// Upper bound for reconnect delays
    pub reconnect_max: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            auto_reconnect: true,
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.reconnect_base.is_zero() || self.reconnect_base > self.reconnect_max {
            return Err(ConfigError::InvalidBackoff);
        }
        Ok(())
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    debounce: Option<Duration>,
    auto_reconnect: Option<bool>,
    reconnect_base: Option<Duration>,
    reconnect_max: Option<Duration>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the debounce window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// Enable or disable automatic reconnects
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    /// Set the reconnect backoff bounds
    pub fn reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base = Some(base);
        self.reconnect_max = Some(max);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self.server_url.map(|url| url.trim_end_matches('/').to_string()),
            debounce: self.debounce.unwrap_or(defaults.debounce),
            auto_reconnect: self.auto_reconnect.unwrap_or(defaults.auto_reconnect),
            reconnect_base: self.reconnect_base.unwrap_or(defaults.reconnect_base),
            reconnect_max: self.reconnect_max.unwrap_or(defaults.reconnect_max),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("reconnect backoff base must be non-zero and not exceed the maximum")]
    InvalidBackoff,
    #[error("failed to read config file: {0}")]
    File(String),
}
