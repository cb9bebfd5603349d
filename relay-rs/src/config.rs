use crate::error::{RelayError, Result};
use crate::smtp::SessionLimits;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `delivery.api_key`
pub const API_KEY_ENV: &str = "SENDGRID_API_KEY";
/// Environment variable overriding `smtp.listen_addr`
pub const LISTEN_ADDR_ENV: &str = "RELAY_LISTEN_ADDR";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Name announced in the greeting and EHLO reply
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// SendGrid API key; usually supplied through `SENDGRID_API_KEY`
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Deadline for relaying one transaction, measured from end of DATA
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// One of "pretty", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_hostname() -> String {
    "relay.localhost".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:2525".to_string()
}

fn default_max_message_size() -> usize {
    25 * 1024 * 1024 // 25MB
}

fn default_max_recipients() -> usize {
    100
}

fn default_api_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_transaction_timeout() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_message_size: default_max_message_size(),
            max_recipients: default_max_recipients(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: default_transaction_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Local development configuration: loopback listener, verbose logs
    pub fn development() -> Self {
        let mut config = Self::default();
        config.smtp.listen_addr = "127.0.0.1:2525".to_string();
        config.logging.level = "debug".to_string();
        config
    }

    /// Apply `SENDGRID_API_KEY` and `RELAY_LISTEN_ADDR` from the process
    /// environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.delivery.api_key = key;
        }
        if let Some(addr) = lookup(LISTEN_ADDR_ENV).filter(|v| !v.trim().is_empty()) {
            self.smtp.listen_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.delivery.api_key.trim().is_empty() {
            return Err(RelayError::Config(format!(
                "No delivery API key configured (set delivery.api_key or {})",
                API_KEY_ENV
            )));
        }

        self.smtp.listen_addr.parse::<SocketAddr>().map_err(|e| {
            RelayError::Config(format!(
                "Invalid listen address '{}': {}",
                self.smtp.listen_addr, e
            ))
        })?;

        if self.smtp.max_message_size == 0 {
            return Err(RelayError::Config(
                "smtp.max_message_size must be greater than zero".to_string(),
            ));
        }
        if self.delivery.request_timeout_secs == 0 {
            return Err(RelayError::Config(
                "delivery.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.relay.transaction_timeout_secs == 0 {
            return Err(RelayError::Config(
                "relay.transaction_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_message_size: self.smtp.max_message_size,
            max_recipients: self.smtp.max_recipients,
            transaction_timeout: Duration::from_secs(self.relay.transaction_timeout_secs),
        }
    }
}
